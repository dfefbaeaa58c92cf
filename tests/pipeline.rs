mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};

use category_matcher::config::VerifierConfig;
use category_matcher::verifier::{DisabledVerifier, OpenRouterVerifier, Verifier};
use category_matcher_core::advisory::SYSTEM_INSTRUCTION;
use category_matcher_core::models::SKIP_LABEL;
use category_matcher_core::{DecisionKind, Matcher, MatcherParams, ProductQuery};

use common::{catalog, entry, TableEncoder};

const GENERATOR: &str = "Генератор бензиновый 2.5 кВт";

fn disabled() -> Arc<dyn Verifier> {
    Arc::new(DisabledVerifier)
}

#[tokio::test]
async fn generator_is_accepted_at_top_tier() {
    let matcher = Matcher::new(
        catalog(vec![
            entry("1001", "Генератор бензиновый", "Генераторы>Бензиновые", &[1.0, 0.02, 0.0]),
            entry("2002", "Мотоблок Нева", "Мотоблоки", &[0.0, 1.0, 0.0]),
            entry("3003", "Свеча зажигания", "Запчасти>Свечи", &[0.0, 0.0, 1.0]),
        ]),
        TableEncoder::new(&[(GENERATOR, &[1.0, 0.0, 0.0])]),
        disabled(),
        MatcherParams::default(),
    );

    let outcome = matcher.match_product(&ProductQuery::new(GENERATOR, "G-25")).await;
    let m = outcome.as_match().expect("success");
    assert_eq!(m.category_path, "Генераторы>Бензиновые");
    assert_eq!(m.matched_id, "1001");
    assert_eq!(m.decision, DecisionKind::Accepted);
    assert!(m.confidence_label.parse::<f32>().unwrap() >= 85.0);
}

#[tokio::test]
async fn all_candidates_below_floor_skip() {
    let matcher = Matcher::new(
        catalog(vec![
            entry("1", "Шланг", "Шланги", &[0.3, 1.0, 0.0]),
            entry("2", "Мотоблок", "Мотоблоки", &[0.0, 1.0, 0.0]),
            entry("3", "Фильтр", "Фильтры", &[0.2, 0.0, 1.0]),
        ]),
        TableEncoder::new(&[("Амортизатор задний", &[1.0, 0.0, 0.0])]),
        disabled(),
        MatcherParams::default(),
    );

    let outcome = matcher
        .match_product(&ProductQuery::new("Амортизатор задний", ""))
        .await;
    let m = outcome.as_match().expect("success");
    assert_eq!(m.category_path, "");
    assert_eq!(m.confidence_label, SKIP_LABEL);
    assert_eq!(m.decision, DecisionKind::Skipped);
}

#[tokio::test]
async fn best_between_floor_and_lowest_threshold_is_undecided() {
    // cos([1, 0], [1, 1.2]) ≈ 0.64
    let matcher = Matcher::new(
        catalog(vec![entry("1", "Фара", "Оптика", &[1.0, 1.2])]),
        TableEncoder::new(&[("Фонарь", &[1.0, 0.0])]),
        disabled(),
        MatcherParams::default(),
    );

    let outcome = matcher.match_product(&ProductQuery::new("Фонарь", "")).await;
    let m = outcome.as_match().expect("success");
    assert_eq!(m.category_path, "");
    assert_eq!(m.confidence_label, "");
    assert_eq!(m.decision, DecisionKind::Undecided);
}

#[tokio::test]
async fn type_phrase_narrows_candidates_before_ranking() {
    // The identical "Шланг" vector is excluded because five entries share
    // the leading word; the first of the equally scored candles wins.
    let mut entries = vec![entry("H", "Шланг топливный", "Шланги", &[1.0, 0.0])];
    for i in 1..=5 {
        entries.push(entry(
            &format!("S{}", i),
            &format!("Свеча зажигания NGK {}", i),
            &format!("Свечи>Серия {}", i),
            &[1.0, 0.75],
        ));
    }
    let matcher = Matcher::new(
        catalog(entries),
        TableEncoder::new(&[("Свеча зажигания", &[1.0, 0.0])]),
        disabled(),
        MatcherParams::default(),
    );

    let evaluation = matcher.evaluate("Свеча зажигания").await.unwrap();
    assert!(evaluation.narrowed);
    assert_eq!(evaluation.candidate_count, 5);

    let decision = evaluation.decision();
    assert_eq!(decision.matched_id, "S1");
    assert_eq!(decision.tier, Some(0.75));
    assert_eq!(decision.confidence_label, "80.0");
    assert_eq!(evaluation.selection.references.len(), 5);
}

fn verifier_config(url: String) -> VerifierConfig {
    VerifierConfig {
        url,
        timeout_secs: 5,
        ..VerifierConfig::default()
    }
}

fn generator_matcher(verifier: Arc<dyn Verifier>) -> Matcher {
    Matcher::new(
        catalog(vec![entry(
            "1001",
            "Генератор бензиновый",
            "Генераторы>Бензиновые",
            &[1.0, 0.0],
        )]),
        TableEncoder::new(&[(GENERATOR, &[1.0, 0.0])]),
        verifier,
        MatcherParams::default(),
    )
}

#[tokio::test]
async fn verifier_failure_leaves_decision_intact() {
    let router = Router::new().route(
        "/chat",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded") }),
    );
    let base = common::spawn(router).await;
    let verifier =
        OpenRouterVerifier::new(&verifier_config(format!("{}/chat", base)), "key").unwrap();

    let outcome = generator_matcher(Arc::new(verifier))
        .match_product(&ProductQuery::new(GENERATOR, "G-25"))
        .await;
    let m = outcome.as_match().expect("success");
    assert_eq!(m.category_path, "Генераторы>Бензиновые");
    assert_eq!(m.decision, DecisionKind::Accepted);
    assert_eq!(m.advisory_text, None);
}

#[tokio::test]
async fn verifier_receives_prompt_and_answer_is_attached() {
    let router = Router::new().route(
        "/chat",
        post(|Json(body): Json<serde_json::Value>| async move {
            let system = body["messages"][0]["content"].as_str().unwrap_or_default();
            let user = body["messages"][1]["content"].as_str().unwrap_or_default();
            let ok = system == SYSTEM_INSTRUCTION
                && user.contains("category!: Бензиновые")
                && user.contains("1. Генераторы>Бензиновые (Генератор бензиновый) — 100.0% [SKU: 1001]");
            if !ok {
                return (StatusCode::BAD_REQUEST, Json(serde_json::json!({})));
            }
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "choices": [{ "message": { "content": "category: Генераторы\ncategory!: Бензиновые\nКомментарий: 99\n" } }]
                })),
            )
        }),
    );
    let base = common::spawn(router).await;
    let verifier =
        OpenRouterVerifier::new(&verifier_config(format!("{}/chat", base)), "key").unwrap();

    let outcome = generator_matcher(Arc::new(verifier))
        .match_product(&ProductQuery::new(GENERATOR, "G-25"))
        .await;
    let m = outcome.as_match().expect("success");
    assert_eq!(
        m.advisory_text.as_deref(),
        Some("category: Генераторы\ncategory!: Бензиновые\nКомментарий: 99")
    );
}
