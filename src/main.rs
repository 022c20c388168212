mod config;
mod dashboard;
mod engine;
mod gateway;
mod notifications;
mod strategies;
mod types;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::{
    form_for, mask_secret, ClientSettings, ConfigSynchronizer, FieldKind, ServiceConfig,
    ACCOUNT_SECTION, CLIENT_SECTION, DATA_SERVICE_SECTION, SECTION_FORMS,
};
use dashboard::{orders_view, positions_view, DashboardSummary};
use engine::{AutoRefresher, ConsoleSession, SessionEvent, TradeDesk, View};
use gateway::{AccountGateway, HttpGateway};
use notifications::{AlertType, NotificationManager, Severity};
use strategies::{AccountChoice, EditSession, FieldId, SaveOutcome, StrategyEditor};
use types::{account_label, format_amount, StrategyRecord, TradeRequest, TradeType};

#[derive(Parser)]
#[command(name = "emtrader-console")]
#[command(version = "0.1.0")]
#[command(about = "Console for the EMTrader account gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file path
    #[arg(short, long, default_value = "console.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show system status and known accounts
    Status,
    /// Ask the gateway to start the trading system
    Start,
    /// Show totals, per-account figures and recent deals
    Dashboard {
        /// Keep refreshing until Ctrl+C
        #[arg(short, long)]
        watch: bool,
    },
    /// Show holdings of one account
    Positions {
        /// Account id (defaults to the first account reported by the gateway)
        #[arg(short, long)]
        account: Option<String>,
    },
    /// Show deals of one account, newest first
    Orders {
        #[arg(short, long)]
        account: Option<String>,
    },
    /// Submit an order
    Trade {
        #[arg(long)]
        code: String,
        /// buy or sell
        #[arg(long, value_enum)]
        side: Side,
        #[arg(long)]
        price: Decimal,
        #[arg(long)]
        count: u64,
        #[arg(short, long)]
        account: Option<String>,
    },
    /// Check whether a stock supports margin trading
    Rzrq {
        code: String,
    },
    /// Manage automated strategies
    Strategies {
        #[command(subcommand)]
        command: StrategyCommand,
    },
    /// Show or change service configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
    Buy,
    Sell,
}

impl From<Side> for TradeType {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => TradeType::Buy,
            Side::Sell => TradeType::Sell,
        }
    }
}

#[derive(Subcommand)]
enum StrategyCommand {
    /// List all strategies
    List,
    /// Create a strategy and save it
    New {
        id: String,
        #[command(flatten)]
        edits: StrategyEdits,
    },
    /// Change an existing strategy
    Edit {
        id: String,
        #[command(flatten)]
        edits: StrategyEdits,
    },
}

#[derive(Args, Debug, Default)]
struct StrategyEdits {
    #[arg(long)]
    enabled: Option<bool>,
    #[arg(long)]
    amount: Option<String>,
    /// auto, normal, credit or custom
    #[arg(long, value_parser = parse_account_choice)]
    account: Option<AccountChoice>,
    /// Account name used with --account custom
    #[arg(long)]
    custom_account: Option<String>,
    #[arg(long)]
    amtkey: Option<String>,
    /// Set a custom field
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,
    /// Remove a custom field
    #[arg(long = "unset", value_name = "KEY")]
    unset: Vec<String>,
}

fn parse_account_choice(s: &str) -> Result<AccountChoice, String> {
    AccountChoice::parse(s).ok_or_else(|| format!("unknown account choice '{}'", s))
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the service configuration
    Show,
    /// Change one field and save every section
    Set {
        /// fha, unp, client or the section label
        section: String,
        key: String,
        value: String,
    },
    /// Write a default settings file for this console
    Init,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { command: ConfigCommand::Init } = cli.command {
        if ClientSettings::write_default(&cli.config)? {
            println!("Wrote {}", cli.config);
        } else {
            println!("{} already exists", cli.config);
        }
        return Ok(());
    }

    let settings = ClientSettings::load(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config))?;

    // RUST_LOG wins over the configured level
    let level = if cli.verbose { "debug" } else { settings.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Using gateway {}", settings.gateway_url);

    let gateway: Arc<dyn AccountGateway> = Arc::new(HttpGateway::from_settings(&settings)?);
    let notifications = NotificationManager::new(settings.max_notifications);
    let session = ConsoleSession::new(gateway.clone(), notifications.clone());

    let result = run(cli.command, &settings, gateway, session).await;
    print_notifications(&notifications).await;
    result
}

async fn run(
    command: Commands,
    settings: &ClientSettings,
    gateway: Arc<dyn AccountGateway>,
    session: ConsoleSession,
) -> Result<()> {
    match command {
        Commands::Status => {
            let report = session.reload_status().await?;
            println!("System: {}", session.system_state().await);
            if let Some(status) = report.status {
                println!("Gateway status: {}", status);
            }
            for account in &session.accounts().await {
                println!("  {:<10} {}", account, account_label(account));
            }
        }
        Commands::Start => {
            TradeDesk::new(gateway, session.clone()).start_system().await?;
            println!("System: {}", session.system_state().await);
        }
        Commands::Dashboard { watch } => {
            run_dashboard(settings, session, watch).await?;
        }
        Commands::Positions { account } => {
            session.switch_view(View::Positions).await;
            let account = resolve_account(&session, account).await?;
            let report = gateway.stocks(&account).await?;
            print_positions(&account, &report.stocks);
        }
        Commands::Orders { account } => {
            session.switch_view(View::Orders).await;
            let account = resolve_account(&session, account).await?;
            let book = gateway.deals(&account).await?;
            print_deals(&format!("Deals of {}", account_label(&account)), &orders_view(&account, &book));
        }
        Commands::Trade { code, side, price, count, account } => {
            session.switch_view(View::Trading).await;
            let request = TradeRequest::new(&code, side.into(), price, count).with_account(account);
            let ack = TradeDesk::new(gateway, session).submit_trade(&request).await?;
            println!("{}", serde_json::to_string_pretty(&ack)?);
        }
        Commands::Rzrq { code } => {
            session.switch_view(View::Trading).await;
            let eligible = TradeDesk::new(gateway, session).check_margin(&code).await?;
            println!("{}: margin trading {}", code.trim(), if eligible { "supported" } else { "not supported" });
        }
        Commands::Strategies { command } => {
            session.switch_view(View::Strategies).await;
            run_strategies(command, gateway, session.notifications().clone()).await?;
        }
        Commands::Config { command } => {
            session.switch_view(View::Config).await;
            run_config(command, gateway, session.notifications().clone()).await?;
        }
    }

    Ok(())
}

async fn resolve_account(session: &ConsoleSession, account: Option<String>) -> Result<String> {
    if let Some(account) = account.filter(|a| !a.trim().is_empty()) {
        return Ok(account.trim().to_string());
    }
    let report = session.reload_status().await?;
    report
        .accounts
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("the gateway reports no accounts; pass --account"))
}

async fn run_dashboard(settings: &ClientSettings, session: ConsoleSession, watch: bool) -> Result<()> {
    session.switch_view(View::Dashboard).await;
    if session.reload_status().await.is_err() {
        warn!("Status unavailable, refreshing without accounts");
    }
    if let Some(summary) = session.refresh_dashboard().await {
        print_dashboard(&summary, settings.recent_deals_limit);
    }

    if !watch {
        return Ok(());
    }

    let mut events = session.subscribe();
    let refresher = AutoRefresher::start(
        session.clone(),
        Duration::from_secs(settings.refresh_interval_secs),
    );
    info!("Watching dashboard, press Ctrl+C to stop");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::DashboardUpdated) => {
                    if let Some(summary) = session.dashboard().await {
                        print_dashboard(&summary, settings.recent_deals_limit);
                    }
                    print_notifications(session.notifications()).await;
                }
                Ok(SessionEvent::StatusChanged(state)) => info!("System: {}", state),
                Ok(SessionEvent::ViewChanged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => warn!("Skipped {} session events", n),
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping");
                break;
            }
        }
    }

    refresher.stop();
    Ok(())
}

async fn run_strategies(
    command: StrategyCommand,
    gateway: Arc<dyn AccountGateway>,
    notifications: NotificationManager,
) -> Result<()> {
    let synchronizer = Arc::new(ConfigSynchronizer::new(gateway.clone()));
    let mut editor = StrategyEditor::new(gateway, synchronizer, notifications);
    editor.load_all().await?;

    match command {
        StrategyCommand::List => {
            if editor.store().is_empty() {
                println!("No strategies");
            }
            for (_, record) in editor.store().iter() {
                print_strategy(record);
            }
        }
        StrategyCommand::New { id, edits } => {
            let id = id.trim().to_string();
            editor.create_new(&id).await?;
            apply_edits(&mut editor, &id, &edits)?;
            save_strategy(&mut editor, &id).await?;
        }
        StrategyCommand::Edit { id, edits } => {
            let id = id.trim().to_string();
            editor
                .begin_edit(&id)
                .map_err(|_| anyhow!("strategy {} not found", id))?;
            apply_edits(&mut editor, &id, &edits)?;
            save_strategy(&mut editor, &id).await?;
        }
    }

    Ok(())
}

async fn save_strategy(editor: &mut StrategyEditor, id: &str) -> Result<()> {
    match editor.save(id).await? {
        SaveOutcome::Unchanged => println!("Strategy {} unchanged", id),
        SaveOutcome::Saved => {
            if let Some(record) = editor.store().get(id) {
                print_strategy(record);
            }
        }
    }
    Ok(())
}

fn apply_edits(editor: &mut StrategyEditor, id: &str, edits: &StrategyEdits) -> Result<()> {
    let session = editor.session_mut(id)?;
    if let Some(enabled) = edits.enabled {
        session.enabled = enabled;
    }
    if let Some(amount) = &edits.amount {
        session.amount = amount.clone();
    }

    match (edits.account, &edits.custom_account) {
        (Some(choice), name) => {
            session.select_account(choice);
            if let Some(name) = name {
                if !session.set_custom_account(name) {
                    bail!("--custom-account needs --account custom");
                }
            }
        }
        (None, Some(name)) => {
            session.select_account(AccountChoice::Custom);
            session.set_custom_account(name);
        }
        (None, None) => {}
    }

    if let Some(amtkey) = &edits.amtkey {
        session.amtkey = amtkey.clone();
    }

    for key in &edits.unset {
        let fields = field_ids(editor.session_mut(id)?, key);
        if fields.is_empty() {
            bail!("no custom field named {}", key);
        }
        for field in fields {
            editor.remove_custom_field(id, field)?;
        }
    }

    for pair in &edits.set {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{}'", pair))?;
        let existing = field_ids(editor.session_mut(id)?, key).first().copied();
        let field = match existing {
            Some(field) => field,
            None => editor.add_custom_field(id)?,
        };
        editor.session_mut(id)?.set_custom_field(field, key, value);
    }

    Ok(())
}

fn field_ids(session: &EditSession, key: &str) -> Vec<FieldId> {
    session
        .custom_fields()
        .iter()
        .filter(|field| field.key.trim() == key.trim())
        .map(|field| field.id)
        .collect()
}

async fn run_config(
    command: ConfigCommand,
    gateway: Arc<dyn AccountGateway>,
    notifications: NotificationManager,
) -> Result<()> {
    let current = gateway.config().await?;

    match command {
        ConfigCommand::Show => print_config(&current),
        ConfigCommand::Set { section, key, value } => {
            let label = section_label(&section)?;
            let form = form_for(label).ok_or_else(|| anyhow!("no form for section {}", label))?;
            let field = form
                .fields
                .iter()
                .find(|field| field.key == key)
                .ok_or_else(|| anyhow!("section {} has no field {}", section, key))?;
            if let FieldKind::Select(options) = field.kind {
                if !options.contains(&value.as_str()) {
                    bail!("{} must be one of {}", key, options.join(", "));
                }
            }

            let sections = current.form_sections(&[(label.to_string(), key, value)]);
            let synchronizer = ConfigSynchronizer::new(gateway);
            match synchronizer.persist_all(&sections).await {
                Ok(count) => {
                    notifications
                        .notify(AlertType::ConfigSaved { sections: count })
                        .await;
                }
                Err(e) => {
                    notifications
                        .notify(AlertType::ConfigSaveFailed {
                            section: e.failed.clone(),
                            message: e.source.to_string(),
                        })
                        .await;
                    return Err(e.into());
                }
            }
        }
        ConfigCommand::Init => bail!("config init does not talk to the gateway"),
    }

    Ok(())
}

fn section_label(name: &str) -> Result<&'static str> {
    match name {
        "fha" | "data" | DATA_SERVICE_SECTION => Ok(DATA_SERVICE_SECTION),
        "unp" | "account" | ACCOUNT_SECTION => Ok(ACCOUNT_SECTION),
        "client" | CLIENT_SECTION => Ok(CLIENT_SECTION),
        other => Err(anyhow!("unknown config section '{}'", other)),
    }
}

fn print_dashboard(summary: &DashboardSummary, recent_limit: usize) {
    println!("\n=== Dashboard ===");
    println!("Total assets:    {:>14.2}", summary.total_assets);
    println!("Available money: {:>14.2}", summary.available_money);
    println!("Position value:  {:>14.2}", summary.position_value);

    println!("\n{:<22} {:>8} {:>16}", "Account", "Holdings", "Available");
    for account in &summary.accounts {
        println!(
            "{:<22} {:>8} {:>16.2}",
            account.label, account.holding_count, account.available_money
        );
    }

    print_deals("Recent deals", summary.recent(recent_limit));

    for failure in &summary.failures {
        println!("! {} {}: {}", failure.account, failure.kind, failure.message);
    }
}

fn print_positions(account: &str, holdings: &[types::Holding]) {
    println!("\n=== Positions of {} ===", account_label(account));
    println!(
        "{:<8} {:<12} {:>10} {:>10} {:>10} {:>10} {:>14} {:>12}",
        "Code", "Name", "Held", "Avail", "Cost", "Price", "Value", "P/L"
    );
    for row in positions_view(holdings) {
        println!(
            "{:<8} {:<12} {:>10} {:>10} {:>10.3} {:>10.3} {:>14.2} {:>12.2}",
            row.code,
            row.name,
            row.hold_count,
            row.available_count,
            row.hold_cost,
            row.latest_price,
            row.market_value,
            row.floating_profit
        );
    }
}

fn print_deals(title: &str, deals: &[dashboard::RecentDeal]) {
    println!("\n=== {} ===", title);
    if deals.is_empty() {
        println!("No deals");
        return;
    }
    println!(
        "{:<20} {:<8} {:<8} {:<6} {:>10} {:>10} {:<10}",
        "Time", "Account", "Code", "Side", "Price", "Count", "Order"
    );
    for deal in deals {
        println!(
            "{:<20} {:<8} {:<8} {:<6} {:>10} {:>10} {:<10}",
            deal.time, deal.account, deal.code, deal.trade_type, deal.price, deal.count, deal.sid
        );
    }
}

fn print_strategy(record: &StrategyRecord) {
    let account = if record.account.is_empty() { "auto" } else { record.account.as_str() };
    println!(
        "{:<24} {:<8} amount={:<12} account={:<10} amtkey={}",
        record.key,
        if record.enabled { "enabled" } else { "disabled" },
        format_amount(record.amount),
        account,
        record.amtkey_str()
    );
    for (key, value) in &record.custom {
        println!("    {} = {}", key, value);
    }
}

fn print_config(config: &ServiceConfig) {
    for form in SECTION_FORMS.iter() {
        println!("\n[{}]", form.label);
        for (field, value) in config.form_values(form) {
            let shown = if field.kind == FieldKind::Password {
                mask_secret(&value)
            } else {
                value
            };
            println!("  {:<24} {}", field.label, shown);
        }
    }
    println!("\n{} strategies configured", config.client.iunstrs.len());
}

async fn print_notifications(notifications: &NotificationManager) {
    for notification in notifications.drain().await {
        let marker = match notification.severity {
            Severity::Success => "ok",
            Severity::Info => "--",
            Severity::Warning => "!!",
            Severity::Error => "xx",
        };
        println!("[{}] {}", marker, notification.message());
    }
}
