use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use handoff_bus::EventBus;
use handoff_core::*;
use handoff_provider::create_answer_engine;
use handoff_schema::{EscalationTicket, InboundMessage};
use handoff_server::state::AppState;
use handoff_tickets::TicketStore;

#[derive(Parser)]
#[command(name = "handoff", version, about = "handoff customer-support conversation router")]
struct Cli {
    #[arg(
        long,
        default_value = ".",
        help = "Root directory (contains config/, data/ and logs/)"
    )]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start the HTTP API server and maintenance loop")]
    Start {
        #[arg(long, help = "Override server.port from main.yaml")]
        port: Option<u16>,
    },
    #[command(about = "Validate config files")]
    Validate,
    #[command(about = "Local REPL against one tenant")]
    Chat {
        #[arg(long, help = "Tenant to talk to")]
        tenant: String,
        #[arg(long, help = "Customer id attached to the session")]
        customer: Option<String>,
    },
    #[command(subcommand, about = "Escalation ticket management")]
    Tickets(TicketCommands),
    #[command(about = "Escalation metrics for a tenant")]
    Metrics {
        #[arg(help = "Tenant ID")]
        tenant: String,
        #[arg(long, default_value = "daily", help = "daily, weekly, monthly or all")]
        period: String,
    },
}

#[derive(Subcommand)]
enum TicketCommands {
    #[command(about = "List tickets")]
    List {
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long, help = "Only pending tickets, in queue order")]
        pending: bool,
    },
    #[command(about = "Show ticket details")]
    Show {
        #[arg(help = "Ticket ID")]
        ticket_id: String,
    },
    #[command(about = "Assign a ticket to an agent")]
    Assign {
        #[arg(help = "Ticket ID")]
        ticket_id: String,
        #[arg(help = "Agent ID")]
        agent_id: String,
    },
    #[command(about = "Mark an assigned ticket as in progress")]
    Start {
        #[arg(help = "Ticket ID")]
        ticket_id: String,
    },
    #[command(about = "Resolve a ticket")]
    Resolve {
        #[arg(help = "Ticket ID")]
        ticket_id: String,
        #[arg(long)]
        notes: Option<String>,
    },
    #[command(about = "Close a resolved ticket")]
    Close {
        #[arg(help = "Ticket ID")]
        ticket_id: String,
    },
    #[command(about = "Delete tickets older than the retention period")]
    Cleanup {
        #[arg(long, help = "Override tickets.retention_days")]
        days: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = cli.root.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "handoff.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Validate => {
            let config = load_config(&cli.root.join("config"))?;
            let customers: usize = config.tenants.iter().map(|t| t.customers.len()).sum();
            println!(
                "Config valid. {} tenants, {} customer profiles, ticket backend: {:?}.",
                config.tenants.len(),
                customers,
                config.main.tickets.backend
            );
        }
        Commands::Start { port } => {
            start_server(&cli.root, port).await?;
        }
        Commands::Chat { tenant, customer } => {
            run_repl(&cli.root, &tenant, customer).await?;
        }
        Commands::Tickets(cmd) => {
            let config = load_config(&cli.root.join("config"))?;
            let store = open_ticket_store(&config, &cli.root)?;
            run_ticket_command(&store, &config, cmd).await?;
        }
        Commands::Metrics { tenant, period } => {
            let period: MetricsPeriod = period.parse()?;
            let config = load_config(&cli.root.join("config"))?;
            if !config.tenants.iter().any(|t| t.tenant_id == tenant) {
                anyhow::bail!("unknown tenant: {tenant}");
            }
            let store = open_ticket_store(&config, &cli.root)?;
            let metrics = compute(&store, &tenant, period).await;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
    }

    Ok(())
}

struct Runtime {
    config: HandoffConfig,
    bus: Arc<EventBus>,
    orchestrator: Arc<Orchestrator>,
}

fn bootstrap(root: &Path) -> Result<Runtime> {
    let config = load_config(&root.join("config"))?;
    let bus = Arc::new(EventBus::new(256));
    let publisher = bus.publisher();

    let repo = open_ticket_repository(&config.main.tickets, root)?;
    let tickets = Arc::new(TicketStore::new(repo).with_bus(publisher.clone()));
    let engine = create_answer_engine(&config.main.answer_engine)?;
    let tenants = Arc::new(TenantRegistry::from_config(&config)?);
    let customers = Arc::new(StaticCustomerDirectory::from_config(&config));
    tracing::info!(
        tenants = tenants.len(),
        customers = customers.len(),
        "tenant registry loaded"
    );

    let orchestrator = Orchestrator::new(
        tenants,
        Arc::new(SessionStore::new()),
        engine,
        TicketFactory::new(tickets).with_bus(publisher.clone()),
        customers,
        publisher,
    )
    .with_settings(OrchestratorSettings::from_config(&config.main));

    Ok(Runtime {
        config,
        bus,
        orchestrator: Arc::new(orchestrator),
    })
}

fn open_ticket_store(config: &HandoffConfig, root: &Path) -> Result<Arc<TicketStore>> {
    let repo = open_ticket_repository(&config.main.tickets, root)?;
    Ok(Arc::new(TicketStore::new(repo)))
}

async fn start_server(root: &Path, port: Option<u16>) -> Result<()> {
    let runtime = bootstrap(root)?;
    let settings = MaintenanceSettings::from_config(&runtime.config.main)?;
    let cancel = CancellationToken::new();

    let notifier = spawn_escalation_notifier(Arc::clone(&runtime.bus));
    let maintenance = spawn_maintenance(
        Arc::clone(runtime.orchestrator.sessions()),
        Arc::clone(runtime.orchestrator.tickets()),
        Arc::clone(&runtime.bus),
        settings,
        cancel.clone(),
    );

    let server = &runtime.config.main.server;
    let addr = format!("{}:{}", server.host, port.unwrap_or(server.port));
    let state = AppState::new(Arc::clone(&runtime.orchestrator), Arc::clone(&runtime.bus));

    let shutdown = {
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    };
    let result = handoff_server::serve(state, &addr, shutdown).await;

    cancel.cancel();
    let _ = maintenance.await;
    notifier.abort();
    tracing::info!("Shutdown complete. Goodbye.");
    result
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                ctrl_c.await.ok();
                tracing::info!("Received SIGINT, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("Received SIGINT, shutting down...");
    }
}

async fn run_repl(root: &Path, tenant: &str, customer: Option<String>) -> Result<()> {
    let runtime = bootstrap(root)?;
    if runtime.orchestrator.tenants().lookup(tenant).is_none() {
        anyhow::bail!("unknown tenant: {tenant}");
    }

    println!("handoff REPL for tenant '{tenant}'. Type 'quit' to exit.");
    println!("---");

    let mut session_id: Option<String> = None;
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input == "quit" || input == "exit" {
            break;
        }
        if input.is_empty() {
            continue;
        }

        let inbound = InboundMessage {
            tenant: tenant.to_string(),
            message: input.to_string(),
            session_id: session_id.clone(),
            customer_id: customer.clone(),
        };

        match runtime.orchestrator.handle_inbound(inbound).await {
            Ok(reply) => {
                println!("{}", reply.message);
                if let Some(reason) = reply.escalation_reason {
                    println!("[escalated: {reason}]");
                } else {
                    println!("[confidence: {:.2}]", reply.confidence);
                }
                session_id = Some(reply.session_id);
            }
            Err(err) => eprintln!("Error: {err}"),
        }
    }

    Ok(())
}

async fn run_ticket_command(
    store: &TicketStore,
    config: &HandoffConfig,
    cmd: TicketCommands,
) -> Result<()> {
    match cmd {
        TicketCommands::List { tenant, pending } => {
            let tickets = if pending {
                store.list_pending(tenant.as_deref()).await
            } else {
                store.list_all(tenant.as_deref()).await
            };
            if tickets.is_empty() {
                println!("No tickets found.");
                return Ok(());
            }
            println!(
                "{:<38} {:<12} {:<8} {:<12} {:<20} {:<20}",
                "TICKET ID", "TENANT", "PRIORITY", "STATUS", "REASON", "CREATED"
            );
            println!("{}", "-".repeat(114));
            for t in &tickets {
                println!(
                    "{:<38} {:<12} {:<8} {:<12} {:<20} {:<20}",
                    t.ticket_id,
                    t.tenant,
                    t.priority.to_string(),
                    t.status.to_string(),
                    t.reason.to_string(),
                    t.created_at.format("%Y-%m-%d %H:%M:%S"),
                );
            }
        }
        TicketCommands::Show { ticket_id } => {
            let ticket = store
                .get(&ticket_id)
                .await
                .ok_or_else(|| anyhow!("ticket not found: {ticket_id}"))?;
            print_ticket(&ticket);
        }
        TicketCommands::Assign {
            ticket_id,
            agent_id,
        } => {
            let ticket = store.assign(&ticket_id, &agent_id).await?;
            println!("Ticket {} assigned to {agent_id}.", ticket.ticket_id);
        }
        TicketCommands::Start { ticket_id } => {
            let ticket = store.start(&ticket_id).await?;
            println!("Ticket {} is now {}.", ticket.ticket_id, ticket.status);
        }
        TicketCommands::Resolve { ticket_id, notes } => {
            let ticket = store.resolve(&ticket_id, notes.as_deref()).await?;
            println!("Ticket {} resolved.", ticket.ticket_id);
        }
        TicketCommands::Close { ticket_id } => {
            let ticket = store.close(&ticket_id).await?;
            println!("Ticket {} closed.", ticket.ticket_id);
        }
        TicketCommands::Cleanup { days } => {
            let days = days.unwrap_or(config.main.tickets.retention_days);
            let cutoff = chrono::Duration::try_days(days)
                .filter(|age| *age > chrono::Duration::zero())
                .and_then(|age| chrono::Utc::now().checked_sub_signed(age))
                .ok_or_else(|| anyhow!("--days must be a positive number of days, got {days}"))?;
            let removed = store.cleanup(cutoff).await?;
            println!("Removed {removed} tickets older than {days} days.");
        }
    }
    Ok(())
}

fn print_ticket(ticket: &EscalationTicket) {
    println!("Ticket: {}", ticket.ticket_id);
    println!("Tenant: {}", ticket.tenant);
    println!("Session: {}", ticket.session_id);
    if let Some(customer) = &ticket.customer_id {
        println!("Customer: {customer}");
    }
    println!("Reason: {}", ticket.reason);
    println!("Priority: {}", ticket.priority);
    println!("Status: {}", ticket.status);
    println!("Department: {}", ticket.department);
    if let Some(agent) = &ticket.assigned_to {
        println!("Assigned to: {agent}");
    }
    println!("Created: {}", ticket.created_at.to_rfc3339());
    println!("Updated: {}", ticket.updated_at.to_rfc3339());
    if let Some(resolved) = ticket.resolved_at {
        println!("Resolved: {}", resolved.to_rfc3339());
    }
    println!("Trigger: {}", ticket.trigger_message);
    println!("\n--- Conversation ---\n{}", ticket.conversation_summary);
    if !ticket.notes.is_empty() {
        println!("\n--- Notes ---");
        for note in &ticket.notes {
            println!("- {note}");
        }
    }
}
