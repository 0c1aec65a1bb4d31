use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use ecopay::application::allocation::{
    calculate_automatic_application, calculate_manual_application, max_applicable_credits,
    validate_custom_amount_input,
};
use ecopay::application::ledger::CreditLedger;
use ecopay::application::session::PaymentSessions;
use ecopay::config::EngineConfig;
use ecopay::domain::bill::Bill;
use ecopay::domain::credit::{CreditRecord, CreditValidator};
use ecopay::domain::ids::IdGenerator;
use ecopay::domain::money::format_currency;
use ecopay::domain::ports::{ClockRef, Notifier};
use ecopay::domain::session::{CardDetails, GatewayOutcome, PaymentMethod};
use ecopay::error::{AllocationError, SessionError};
use ecopay::infrastructure::clock::SystemClock;
use ecopay::infrastructure::gateway::SimulatedGateway;
use ecopay::infrastructure::in_memory::{InMemoryBillStore, InMemoryCreditStore};
use ecopay::infrastructure::notify::LogNotifier;
use ecopay::interfaces::csv::credit_reader::CreditReader;
use ecopay::interfaces::csv::credit_writer::CreditWriter;
use ecopay::logging::init_tracing;
use miette::{IntoDiagnostic, MietteDiagnostic, Report, Result};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const RESIDENT_ID: &str = "RES-001";
const BILL_ID: &str = "BILL-001";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate and categorize a credits CSV; active credits go to stdout
    Credits {
        /// Input credits CSV file
        input: PathBuf,
    },
    /// Show how credits would pay down a bill
    Allocate(AllocateArgs),
    /// Pay a bill end to end against the simulated gateway
    Pay(PayArgs),
}

#[derive(Args)]
struct AllocateArgs {
    /// Input credits CSV file
    input: PathBuf,

    /// Bill amount
    #[arg(long)]
    bill: Decimal,

    /// Apply exactly these credit ids
    #[arg(long, value_delimiter = ',', conflicts_with = "amount")]
    select: Vec<String>,

    /// Check a typed-in amount of credits
    #[arg(long)]
    amount: Option<String>,
}

#[derive(Args)]
struct PayArgs {
    /// Input credits CSV file
    input: PathBuf,

    /// Bill amount
    #[arg(long)]
    bill: Decimal,

    /// Amount of credits to apply before paying
    #[arg(long)]
    credits: Option<Decimal>,

    /// Seed for the simulated gateway and identifiers
    #[arg(long)]
    seed: Option<u64>,

    /// Also email the receipt to this address
    #[arg(long)]
    email: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = EngineConfig::load(cli.config.as_deref()).into_diagnostic()?;
    let ledger = CreditLedger::new(
        CreditValidator::new(config.self_heal_expired),
        config.expiring_soon_days,
    );

    match cli.command {
        Command::Credits { input } => show_credits(&ledger, &input),
        Command::Allocate(args) => allocate(&ledger, args),
        Command::Pay(args) => pay(&config, args).await,
    }
}

fn read_credits(path: &Path) -> Result<Vec<Value>> {
    let file = File::open(path).into_diagnostic()?;
    CreditReader::new(file).read_all().into_diagnostic()
}

fn show_credits(ledger: &CreditLedger, input: &Path) -> Result<()> {
    let records = read_credits(input)?;
    let display = ledger.process_records(&records, Utc::now());

    let stdout = io::stdout();
    let mut writer = CreditWriter::new(stdout.lock());
    writer
        .write_credits(display.active_credits.iter().map(|entry| &entry.credit))
        .into_diagnostic()?;

    let summary = &display.summary;
    eprintln!(
        "{} valid, {} invalid",
        display.valid_credits_count, display.invalid_credits_count
    );
    eprintln!(
        "active:   {} ({})",
        summary.active_count,
        format_currency(summary.total_active)
    );
    eprintln!(
        "redeemed: {} ({})",
        summary.redeemed_count,
        format_currency(summary.total_redeemed)
    );
    eprintln!(
        "expired:  {} ({})",
        summary.expired_count,
        format_currency(summary.total_expired)
    );
    if summary.expiring_soon_count > 0 {
        eprintln!(
            "expiring soon: {} ({})",
            summary.expiring_soon_count,
            format_currency(summary.expiring_soon_amount)
        );
    }
    Ok(())
}

fn allocate(ledger: &CreditLedger, args: AllocateArgs) -> Result<()> {
    let records = read_credits(&args.input)?;
    let now = Utc::now();
    let credits = ledger.valid_credits(&records, now);

    let output = if let Some(input) = &args.amount {
        let available: Decimal = credits
            .iter()
            .filter(|c| c.is_spendable(now))
            .map(CreditRecord::value)
            .sum();
        let amount =
            validate_custom_amount_input(input, available, args.bill).map_err(allocation_report)?;
        json!({
            "amount": amount,
            "newBillAmount": args.bill - amount,
            "maxApplicable": max_applicable_credits(available, args.bill),
        })
    } else if !args.select.is_empty() {
        let result = calculate_manual_application(&args.select, &credits, args.bill, now)
            .map_err(allocation_report)?;
        serde_json::to_value(result).into_diagnostic()?
    } else {
        serde_json::to_value(calculate_automatic_application(&credits, args.bill, now))
            .into_diagnostic()?
    };

    println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
    Ok(())
}

async fn pay(config: &EngineConfig, args: PayArgs) -> Result<()> {
    let records = read_credits(&args.input)?;
    let clock: ClockRef = Arc::new(SystemClock);

    let mut gateway_config = config.gateway.clone();
    if args.seed.is_some() {
        gateway_config.seed = args.seed;
    }
    let ids = Arc::new(match gateway_config.seed {
        Some(seed) => IdGenerator::seeded(seed),
        None => IdGenerator::from_entropy(),
    });

    let bills = InMemoryBillStore::new();
    bills
        .insert(Bill::new(BILL_ID, RESIDENT_ID, args.bill, clock.now()))
        .await;
    let credits = InMemoryCreditStore::new();
    credits.extend(RESIDENT_ID, records).await;

    let sessions = PaymentSessions::new(
        Arc::new(bills),
        Arc::new(credits),
        Arc::new(SimulatedGateway::new(gateway_config, clock.clone())),
        clock,
        ids,
        config,
    );
    let notifier = LogNotifier::new();

    let session = sessions
        .initiate(RESIDENT_ID, BILL_ID)
        .await
        .map_err(session_report)?;
    let session_id = session.session_id;

    if let Some(amount) = args.credits {
        let applied = sessions
            .apply_credits(&session_id, amount)
            .await
            .map_err(session_report)?;
        eprintln!(
            "applied {} in credits, {} left to pay",
            format_currency(applied.applied),
            format_currency(applied.new_final_amount)
        );
    }

    let outcome = sessions
        .process_payment(&session_id, &test_card())
        .await
        .map_err(session_report)?;

    let output = match outcome {
        GatewayOutcome::Approved {
            transaction_id,
            amount,
            ..
        } => {
            let record = sessions
                .record_success(&session_id, &transaction_id, amount)
                .await
                .map_err(session_report)?;
            notifier.send_confirmation(&record).await.into_diagnostic()?;
            notifier.generate_receipt_pdf(&record).await.into_diagnostic()?;
            if let Some(email) = &args.email {
                notifier
                    .send_receipt_email(&record, email)
                    .await
                    .into_diagnostic()?;
            }
            serde_json::to_value(&record).into_diagnostic()?
        }
        GatewayOutcome::Declined { code, message, .. } => {
            let failure = sessions
                .record_failure(&session_id, code, &message)
                .await
                .map_err(session_report)?;
            notifier
                .send_failure_notice(&failure)
                .await
                .into_diagnostic()?;
            serde_json::to_value(&failure).into_diagnostic()?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
    Ok(())
}

fn test_card() -> PaymentMethod {
    PaymentMethod::Card(CardDetails {
        number: "4242 4242 4242 4242".into(),
        cvv: "123".into(),
        expiry_month: "12".into(),
        expiry_year: "2099".into(),
        holder_name: "Test Resident".into(),
    })
}

fn allocation_report(err: AllocationError) -> Report {
    Report::new(MietteDiagnostic::new(err.to_string()).with_code(err.code()))
}

fn session_report(err: SessionError) -> Report {
    Report::new(MietteDiagnostic::new(err.to_string()).with_code(err.code()))
}
