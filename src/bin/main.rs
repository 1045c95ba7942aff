use react_trading_agent::{
    agent::{Orchestrator, Session},
    config::AgentConfig,
    events::{AgentEvent, FanoutEventSink, MemoryEventSink, TracingEventSink},
    llm::OpenRouterClient,
    market::YahooMarketData,
    models::ActionKind,
    portfolio::Portfolio,
    prompts::PromptLibrary,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    // Credential problems stop here, before any state transition
    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Set OPENROUTER_API_KEY (see .env) and try again.");
            std::process::exit(1);
        }
    };

    let prompts = match &config.prompts_dir {
        Some(dir) => PromptLibrary::load_dir(dir)?,
        None => PromptLibrary::builtin()?,
    };

    info!(
        model = %config.settings.model_id,
        episodes = config.episodes,
        symbols = ?config.symbols,
        "ReAct trading agent starting"
    );

    // Create components
    let model = Box::new(OpenRouterClient::new(config.api_key.clone())?);
    let market = Box::new(YahooMarketData::new()?);

    let recorded = MemoryEventSink::new();
    let orchestrator = Orchestrator::new(model, market, prompts, config.settings.clone())
        .with_events(
            FanoutEventSink::new()
                .with(TracingEventSink)
                .with(recorded.clone()),
        );

    let session = Session::new(Portfolio::new(config.initial_cash));
    let final_session = orchestrator
        .run(session, &config.symbols, config.episodes)
        .await;

    let portfolio = &final_session.portfolio;
    println!("\n=== FINAL AGENT STATE ===");
    println!("Holdings Value: ${:.2}", portfolio.total_market_value());
    println!("Cash: ${:.2}", portfolio.cash());
    println!("Total Value: ${:.2}", portfolio.total_value());
    println!(
        "Holdings: {}",
        serde_json::to_string(&portfolio.holdings())?
    );
    println!("Trading Days: {}", final_session.day - 1);
    println!(
        "Rejected Trades: {}",
        recorded.count(|e| matches!(
            e,
            AgentEvent::Acted { executed: false, action, .. } if action.kind != ActionKind::Done
        ))
    );
    println!(
        "Coerced Decisions: {}",
        recorded.count(|e| matches!(e, AgentEvent::DecisionCoerced { .. }))
    );

    if !final_session.actions.is_empty() {
        println!("\nActions Taken:");
        for (i, action) in final_session.actions.iter().enumerate() {
            println!("  {}. {} - {}", i + 1, action, action.reasoning);
        }
    }

    Ok(())
}
