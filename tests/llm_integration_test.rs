//! Live checks against the LLM providers. Run with `--features api`.

use oracle_chess::llm_client::{LlmClient, LlmConfig, LlmProvider};
use oracle_chess::{BoardState, LlmOracle, MoveArbiter, MoveOracle, ResolutionTier, RulesEngine};
use std::time::Duration;
use tracing::instrument;

fn live_config(provider: LlmProvider, model: &str) -> LlmConfig {
    dotenvy::dotenv().ok();
    let api_key = std::env::var(provider.api_key_var())
        .unwrap_or_else(|_| panic!("{} not set", provider.api_key_var()));
    LlmConfig::new(provider, api_key, model.to_string(), 50, Duration::from_secs(30))
}

#[tokio::test]
#[cfg_attr(not(feature = "api"), ignore)]
#[instrument]
async fn test_anthropic_connectivity() {
    let client = LlmClient::new(live_config(LlmProvider::Anthropic, "claude-3-5-haiku-20241022")).unwrap();

    let response = client
        .generate("You are a helpful assistant.", "Say 'Hello, world!' and nothing else.")
        .await
        .expect("Failed to generate");

    assert!(!response.is_empty(), "Response should not be empty");
    eprintln!("Response: {}", response);
}

#[tokio::test]
#[cfg_attr(not(feature = "api"), ignore)]
#[instrument]
async fn test_openai_connectivity() {
    let client = LlmClient::new(live_config(LlmProvider::OpenAI, "gpt-4o-mini")).unwrap();

    let response = client
        .generate("You are a helpful assistant.", "Say 'Hello, world!' and nothing else.")
        .await
        .expect("Failed to generate");

    assert!(!response.is_empty(), "Response should not be empty");
    eprintln!("Response: {}", response);
}

#[tokio::test]
#[cfg_attr(not(feature = "api"), ignore)]
#[instrument]
async fn test_oracle_answer_resolves_to_legal_move() {
    let client = LlmClient::new(live_config(LlmProvider::Anthropic, "claude-3-5-haiku-20241022")).unwrap();
    let oracle = LlmOracle::new(client, 32);
    let rules = RulesEngine::new();

    let position = BoardState::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1").unwrap();
    let legal = rules.legal_moves(&position);
    let answer = oracle.suggest(&position, &legal).await.expect("oracle unavailable");
    eprintln!("Oracle answered: {}", answer);

    let resolution = MoveArbiter::new(rules)
        .resolve(&position, &legal, Some(&answer))
        .unwrap();
    assert!(legal.contains(resolution.chosen()));
    assert_ne!(*resolution.tier(), ResolutionTier::Fallback, "answer was not a move: {}", answer);
}
