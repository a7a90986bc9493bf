//! End-to-end pipeline tests with a scripted model and in-memory storage.

use restaurant_finance_agent::agent::{AgentConfig, FinanceAgent};
use restaurant_finance_agent::model::{ModelResponse, ScriptedModel, ToolCallRequest};
use restaurant_finance_agent::models::TurnOutcome;
use restaurant_finance_agent::store::{
    FinanceStore, InMemoryFinanceStore, MenuItem, RecipeLine, UserProfile,
};
use restaurant_finance_agent::tools::ToolRegistry;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ModelResponse {
    ModelResponse::ToolCalls(vec![ToolCallRequest {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }])
}

fn build_agent(
    script: Vec<ModelResponse>,
) -> (FinanceAgent, Arc<InMemoryFinanceStore>) {
    let store = Arc::new(InMemoryFinanceStore::new());
    let agent = FinanceAgent::new(
        Arc::new(ScriptedModel::new(script)),
        ToolRegistry::with_builtin_tools(),
        store.clone(),
        AgentConfig::default(),
    );
    (agent, store)
}

async fn seed_restaurant(store: &InMemoryFinanceStore) {
    store
        .seed_profile(UserProfile {
            restaurant_id: 1,
            restaurant_name: "Cantina da Nonna".to_string(),
            person_name: Some("Marina".to_string()),
            cmv_target_percent: Some(32.0),
            savings_opportunity: None,
        })
        .await;
}

#[tokio::test]
async fn monthly_closure_conversation_end_to_end() {
    // "preciso fechar o mês" → open the aggregate, submit revenue, generate.
    let (agent, store) = build_agent(vec![
        tool_call("c1", "start_monthly_closure", json!({"year": 2025, "month": 7})),
        ModelResponse::Final("Fechamento aberto. Qual foi o faturamento de julho?".to_string()),
        tool_call("c2", "submit_revenue", json!({"total_revenue": 40000.0})),
        tool_call("c3", "generate_monthly_report", json!({})),
        ModelResponse::Final("Seu CMV de julho ficou em 30%, dentro da meta.".to_string()),
    ]);
    seed_restaurant(&store).await;
    store
        .record_invoice(restaurant_finance_agent::store::InvoiceRecord {
            id: Uuid::new_v4(),
            restaurant_id: 1,
            supplier: "Atacadão".to_string(),
            total_amount: 12_000.0,
            invoice_date: chrono::NaiveDate::from_ymd_opt(2025, 7, 10).unwrap(),
            lines: vec![],
        })
        .await
        .unwrap();
    agent.link_restaurant("chat-1", 1, false).await;

    let reply = agent
        .handle_message("chat-1", "preciso fechar o mês", false)
        .await
        .unwrap();
    assert_eq!(reply.outcome, TurnOutcome::Answered);

    let log = agent.audit().get(reply.turn_id).await.unwrap();
    assert_eq!(log.intent.label.to_string(), "monthly_closure");
    assert_eq!(log.intent.confidence, 0.9);
    assert_eq!(log.tool_calls.len(), 1);

    let report = store.find_report(1, 2025, 7).await.unwrap().unwrap();
    assert_eq!(
        report.status,
        restaurant_finance_agent::store::ReportStatus::AwaitingRevenue
    );

    // Second turn: the user hands over the revenue and the report closes.
    let reply = agent
        .handle_message("chat-1", "faturamos 40 mil", false)
        .await
        .unwrap();
    assert_eq!(reply.outcome, TurnOutcome::Answered);

    let report = store.find_report(1, 2025, 7).await.unwrap().unwrap();
    assert_eq!(report.cmv_percent, Some(30.0));
    assert_eq!(
        report.status,
        restaurant_finance_agent::store::ReportStatus::OnTarget
    );
}

#[tokio::test]
async fn cmv_query_writes_costs_back() {
    let (agent, store) = build_agent(vec![
        tool_call(
            "c1",
            "calculate_menu_item_cost",
            json!({"item_name": "picanha"}),
        ),
        ModelResponse::Final("O food cost da picanha é de 11%.".to_string()),
    ]);
    seed_restaurant(&store).await;
    store
        .seed_menu_item(MenuItem {
            id: Uuid::new_v4(),
            restaurant_id: 1,
            name: "Picanha Grelhada".to_string(),
            sale_price: 50.0,
            recipe: vec![RecipeLine {
                ingredient: "picanha".to_string(),
                quantity_per_serving: 0.2,
                unit: "kg".to_string(),
                waste_percent: 10.0,
            }],
            food_cost: None,
            food_cost_percent: None,
            contribution_margin: None,
            profitability_tier: None,
        })
        .await;
    store.seed_historical_cost(1, "picanha", 25.0).await;
    agent.link_restaurant("chat-1", 1, false).await;

    let reply = agent
        .handle_message("chat-1", "quanto custa meu prato de picanha?", false)
        .await
        .unwrap();
    assert_eq!(reply.outcome, TurnOutcome::Answered);

    let item = store.menu_item_by_name(1, "picanha").await.unwrap().unwrap();
    assert_eq!(item.food_cost, Some(5.5));
    assert_eq!(item.food_cost_percent, Some(11.0));
}

#[tokio::test]
async fn relentless_tool_calling_hits_the_round_bound() {
    let store = Arc::new(InMemoryFinanceStore::new());
    let agent = FinanceAgent::new(
        Arc::new(ScriptedModel::cycling(vec![tool_call(
            "c1",
            "get_watchlist",
            json!({}),
        )])),
        ToolRegistry::with_builtin_tools(),
        store,
        AgentConfig::default(),
    );
    agent.link_restaurant("chat-1", 1, false).await;

    let reply = agent.handle_message("chat-1", "oi", false).await.unwrap();
    assert_eq!(reply.outcome, TurnOutcome::Exhausted);

    let log = agent.audit().get(reply.turn_id).await.unwrap();
    assert_eq!(log.tool_calls.len(), 8);
    assert!(log.sealed);
}

#[tokio::test]
async fn attachment_shortcut_classifies_as_invoice_upload() {
    let (agent, _store) = build_agent(vec![ModelResponse::Final(
        "Recebi a nota, vou registrar.".to_string(),
    )]);
    agent.link_restaurant("chat-1", 1, false).await;

    let reply = agent.handle_message("chat-1", "segue a foto", true).await.unwrap();
    let log = agent.audit().get(reply.turn_id).await.unwrap();
    assert_eq!(log.intent.label.to_string(), "invoice_upload");
    assert_eq!(log.intent.confidence, 0.95);
}

#[tokio::test]
async fn new_user_routes_to_onboarding() {
    let (agent, _store) = build_agent(vec![ModelResponse::Final(
        "Bem-vindo! Qual o nome do seu restaurante?".to_string(),
    )]);

    let reply = agent.handle_message("chat-9", "oi", false).await.unwrap();
    let log = agent.audit().get(reply.turn_id).await.unwrap();
    assert_eq!(log.intent.label.to_string(), "onboarding");
    assert_eq!(log.intent.confidence, 1.0);
}

#[tokio::test]
async fn prompt_snapshot_recorded_per_turn() {
    let (agent, store) = build_agent(vec![
        ModelResponse::Final("Oi!".to_string()),
        ModelResponse::Final("Vamos fechar o mês.".to_string()),
    ]);
    seed_restaurant(&store).await;
    agent.link_restaurant("chat-1", 1, false).await;

    agent.handle_message("chat-1", "bom dia", false).await.unwrap();
    agent
        .handle_message("chat-1", "quero fazer o fechamento do mês", false)
        .await
        .unwrap();

    let logs = agent.audit().list_for_conversation("chat-1").await;
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].prompt.hash.len(), 16);
    assert!(logs[0].prompt.total_tokens > 0);
    // Different intents compose different prompts.
    assert_ne!(logs[0].prompt.hash, logs[1].prompt.hash);
}
