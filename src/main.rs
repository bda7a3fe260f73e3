//! Smart Dashboard - headless refresher
//!
//! Polls entity states and projects them into a document described by a
//! bindings file, or evaluates conditions and layouts against a single
//! refresh.

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smart_dashboard::config::{parse_user, BindingsFile, Command};
use smart_dashboard::dom::{BoundElement, Document, VirtualDocument};
use smart_dashboard::layout::DashboardLayout;
use smart_dashboard::{Args, SmartDashboard};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("smart_dashboard={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    match args.command.clone() {
        Command::Watch { bindings } => {
            let document = Arc::new(BindingsFile::load(&bindings)?.into_document());
            let dashboard = SmartDashboard::with_config(args.refresher_config(), Arc::clone(&document))?;
            watch(&args, &dashboard, &document).await?;
        }
        Command::Eval { expressions, user } => {
            let document = Arc::new(VirtualDocument::new(0.0));
            let dashboard = SmartDashboard::with_config(args.refresher_config(), document)?;
            dashboard.refresh().await?;

            let user = user.as_deref().map(parse_user);
            for expression in &expressions {
                println!("{}\t{}", dashboard.evaluate(expression, user.as_ref()), expression);
            }
        }
        Command::Layout { file, user } => {
            let mut layout = DashboardLayout::load(&file)?;
            let document = Arc::new(VirtualDocument::new(0.0));
            let dashboard = SmartDashboard::with_config(args.refresher_config(), document)?;
            dashboard.refresh().await?;

            let user = user.as_deref().map(parse_user);
            layout.apply_conditions(dashboard.evaluator(), user.as_ref());
            layout.filter_existing_entities(&dashboard.cache().snapshot());
            layout.deduplicate_cards();
            print!("{}", layout.to_yaml()?);
        }
    }

    Ok(())
}

async fn watch(
    args: &Args,
    dashboard: &SmartDashboard<VirtualDocument>,
    document: &VirtualDocument,
) -> anyhow::Result<()> {
    info!(
        elements = document.bound_elements().len(),
        viewport_height = document.viewport_height(),
        "Watching bound elements"
    );

    dashboard.start(args.interval());

    let mut last: HashMap<usize, String> = HashMap::new();
    let mut ticks = tokio::time::interval(args.interval());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticks.tick() => {
                for element in document.bound_elements() {
                    let text = element.text();
                    if last.get(&element.node_id()) != Some(&text) {
                        info!(
                            entity_id = %element.entity_id().unwrap_or_default(),
                            text = %text,
                            "Element updated"
                        );
                        last.insert(element.node_id(), text);
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Received Ctrl-C, stopping");
                break;
            }
        }
    }

    dashboard.stop();

    for element in document.bound_elements() {
        println!(
            "{}\t{}",
            element.entity_id().unwrap_or_default(),
            element.text()
        );
    }
    Ok(())
}
