use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::application::LedgerService;
use crate::config::{self, AppConfig};
use crate::domain::{
    Account, AccountId, AccountUpdate, ClientId, ClientUpdate, NewAccount, NewClient, Transaction,
    TransactionId, TransferRequest, format_cents, parse_cents, timestamp,
};
use crate::{http, logging};

/// Tally - client accounts and atomic money transfers
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "A ledger of client accounts with atomic, idempotent transfers")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to ./tally.toml)
    #[arg(short, long, global = true, env = "TALLY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file path (overrides database.url)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Client management commands
    #[command(subcommand)]
    Client(ClientCommands),

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Move money from one account to another
    Transfer {
        /// Amount to transfer (e.g., "50.00" or "50")
        amount: String,

        /// Source account id
        #[arg(long)]
        from: AccountId,

        /// Destination account key
        #[arg(long)]
        to: String,

        /// Token that makes retries of this transfer safe
        #[arg(long)]
        idempotency_key: Option<String>,

        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// List transactions
    Transactions {
        /// Only transactions touching this account id
        #[arg(long)]
        account: Option<AccountId>,
    },

    /// Show a single transaction
    Show {
        /// Transaction id
        id: TransactionId,
    },

    /// Verify ledger integrity
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export
        #[arg(value_enum, default_value_t = ExportKind::Transactions)]
        kind: ExportKind,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format for transactions
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,

        /// Only transactions touching this account id
        #[arg(long)]
        account: Option<AccountId>,
    },

    /// Serve the REST API
    Serve {
        /// Bind address (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
pub enum ClientCommands {
    /// Register a new client
    Create {
        name: String,

        /// Email address (must be unique)
        email: String,
    },

    /// List all clients
    List,

    /// Show a client and its accounts
    Show { id: ClientId },

    /// Change a client's name or email
    Update {
        id: ClientId,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,
    },

    /// Delete a client that owns no accounts
    Delete { id: ClientId },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Create {
        /// Account key (unique, no whitespace)
        key: String,

        /// Owning client id
        #[arg(long)]
        client: ClientId,

        /// Opening balance (e.g., "100.00")
        #[arg(short, long, default_value = "0")]
        balance: String,
    },

    /// List accounts
    List {
        /// Only accounts owned by this client id
        #[arg(long)]
        client: Option<ClientId>,
    },

    /// Show an account by id or key
    Show { account: String },

    /// Change an account's owner, key or balance
    Update {
        id: AccountId,

        #[arg(long)]
        client: Option<ClientId>,

        #[arg(long)]
        key: Option<String>,

        #[arg(short, long)]
        balance: Option<String>,
    },

    /// Delete an account with a zero balance
    Delete { id: AccountId },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportKind {
    /// The transaction log
    Transactions,
    /// Clients, accounts and transactions as one JSON document
    Snapshot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl Cli {
    /// Load configuration and apply command-line overrides.
    fn resolve_config(&self) -> Result<AppConfig> {
        let mut cfg = config::load(self.config.as_deref())?;
        if let Some(path) = &self.database {
            cfg.database.url = format!("sqlite:{}", path.display());
        }
        if let Commands::Serve { host, port } = &self.command {
            if let Some(host) = host {
                cfg.server.host = host.clone();
            }
            if let Some(port) = port {
                cfg.server.port = *port;
            }
        }
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub async fn run(self) -> Result<()> {
        // A local .env is optional.
        let _ = dotenvy::dotenv();
        let cfg = self.resolve_config()?;
        logging::init(&cfg.log, self.verbose);

        let options = cfg.store_options();
        let settings = cfg.transfer_settings();

        let service = if let Commands::Init = self.command {
            LedgerService::init(&options, settings).await?
        } else {
            LedgerService::connect(&options, settings)
                .await
                .with_context(|| format!("Failed to open {} (run `tally init` first?)", options.url))?
        };
        let result = self.dispatch(&service, &cfg).await;
        service.close().await;
        result
    }

    async fn dispatch(self, service: &LedgerService, cfg: &AppConfig) -> Result<()> {
        match self.command {
            Commands::Init => println!("Database initialized: {}", cfg.database.url),

            Commands::Client(cmd) => run_client_command(service, cmd).await?,

            Commands::Account(cmd) => run_account_command(service, cmd).await?,

            Commands::Transfer {
                amount,
                from,
                to,
                idempotency_key,
                timeout_ms,
            } => {
                let amount_cents =
                    parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
                let mut request = TransferRequest::new(from, to, amount_cents);
                if let Some(key) = idempotency_key {
                    request = request.with_idempotency_key(key);
                }
                if let Some(ms) = timeout_ms {
                    request = request.with_timeout(Duration::from_millis(ms));
                }

                let tx = service.transfer(request).await?;
                println!(
                    "Transferred {} from account {} to {} (transaction {})",
                    format_cents(tx.amount),
                    tx.from_account,
                    tx.to_account,
                    tx.id
                );
            }

            Commands::Transactions { account } => {
                let transactions = match account {
                    Some(id) => service.account_transactions(id).await?,
                    None => service.list_transactions().await?,
                };
                print_transactions(&transactions);
            }

            Commands::Show { id } => {
                let tx = service.get_transaction(id).await?;
                println!("Transaction {}", tx.id);
                println!("  Timestamp:    {}", timestamp::format(&tx.timestamp));
                println!("  From account: {}", tx.from_account);
                println!("  To account:   {}", tx.to_account);
                println!("  Amount:       {}", format_cents(tx.amount));
                if let Some(key) = &tx.idempotency_key {
                    println!("  Idempotency:  {key}");
                }
            }

            Commands::Check => run_check_command(service).await?,

            Commands::Export {
                kind,
                output,
                format,
                account,
            } => run_export_command(service, kind, output, format, account).await?,

            Commands::Serve { .. } => {
                let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
                http::serve(service.clone(), &addr, http::shutdown_signal()).await?;
            }
        }

        Ok(())
    }
}

async fn run_client_command(service: &LedgerService, cmd: ClientCommands) -> Result<()> {
    match cmd {
        ClientCommands::Create { name, email } => {
            let client = service.create_client(NewClient::new(name, email)).await?;
            println!("Created client {}: {} <{}>", client.id, client.name, client.email);
        }

        ClientCommands::List => {
            let clients = service.list_clients().await?;
            if clients.is_empty() {
                println!("No clients found.");
            } else {
                println!("{:>6}  {:<24} {:<32}", "ID", "NAME", "EMAIL");
                println!("{}", "-".repeat(64));
                for client in &clients {
                    println!(
                        "{:>6}  {:<24} {:<32}",
                        client.id,
                        truncate(&client.name, 24),
                        truncate(&client.email, 32)
                    );
                }
            }
        }

        ClientCommands::Show { id } => {
            let client = service.get_client(id).await?;
            let accounts = service.list_client_accounts(id).await?;
            println!("Client: {}", client.name);
            println!("  ID:       {}", client.id);
            println!("  Email:    {}", client.email);
            println!("  Created:  {}", client.created_at.format("%Y-%m-%d %H:%M:%S"));
            println!();
            if accounts.is_empty() {
                println!("No accounts.");
            } else {
                print_accounts(&accounts);
            }
        }

        ClientCommands::Update { id, name, email } => {
            let mut update = ClientUpdate::default();
            if let Some(name) = name {
                update = update.with_name(name);
            }
            if let Some(email) = email {
                update = update.with_email(email);
            }
            let client = service.update_client(id, update).await?;
            println!("Updated client {}: {} <{}>", client.id, client.name, client.email);
        }

        ClientCommands::Delete { id } => {
            service.delete_client(id).await?;
            println!("Deleted client {id}");
        }
    }
    Ok(())
}

async fn run_account_command(service: &LedgerService, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Create {
            key,
            client,
            balance,
        } => {
            let balance = parse_cents(&balance).context("Invalid balance format")?;
            let account = service
                .create_account(NewAccount::new(client, key).with_balance(balance))
                .await?;
            println!(
                "Created account {} ({}) for client {} with balance {}",
                account.id,
                account.key,
                account.client_id,
                format_cents(account.balance)
            );
        }

        AccountCommands::List { client } => {
            let accounts = match client {
                Some(id) => service.list_client_accounts(id).await?,
                None => service.list_accounts().await?,
            };
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                print_accounts(&accounts);
            }
        }

        AccountCommands::Show { account } => {
            let account = match account.parse::<AccountId>() {
                Ok(id) => service.get_account(id).await?,
                Err(_) => service.get_account_by_key(&account).await?,
            };
            let transactions = service.account_transactions(account.id).await?;
            println!("Account: {}", account.key);
            println!("  ID:           {}", account.id);
            println!("  Client:       {}", account.client_id);
            println!("  Balance:      {}", format_cents(account.balance));
            println!(
                "  Created:      {}",
                account.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!("  Transactions: {}", transactions.len());
        }

        AccountCommands::Update {
            id,
            client,
            key,
            balance,
        } => {
            let mut update = AccountUpdate::default();
            if let Some(client) = client {
                update = update.with_client(client);
            }
            if let Some(key) = key {
                update = update.with_key(key);
            }
            if let Some(balance) = balance {
                update = update.with_balance(parse_cents(&balance).context("Invalid balance format")?);
            }
            let account = service.update_account(id, update).await?;
            println!(
                "Updated account {} ({}): balance {}",
                account.id,
                account.key,
                format_cents(account.balance)
            );
        }

        AccountCommands::Delete { id } => {
            service.delete_account(id).await?;
            println!("Deleted account {id}");
        }
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Clients:      {}", report.client_count);
    println!("Accounts:     {}", report.account_count);
    println!("Transactions: {}", report.transaction_count);
    println!("Total held:   {}", format_cents(report.total_balance));
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    kind: ExportKind,
    output: Option<PathBuf>,
    format: ExportFormat,
    account: Option<AccountId>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match &output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match kind {
        ExportKind::Transactions => {
            let count = match format {
                ExportFormat::Csv => exporter.export_transactions_csv(writer, account).await?,
                ExportFormat::Json => exporter.export_transactions_json(writer, account).await?,
            };
            if output.is_some() {
                eprintln!("Exported {count} transactions");
            }
        }
        ExportKind::Snapshot => {
            let snapshot = exporter.export_snapshot_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported snapshot: {} clients, {} accounts, {} transactions",
                    snapshot.clients.len(),
                    snapshot.accounts.len(),
                    snapshot.transactions.len()
                );
            }
        }
    }

    Ok(())
}

fn print_accounts(accounts: &[Account]) {
    println!("{:>6}  {:<24} {:>8} {:>14}", "ID", "KEY", "CLIENT", "BALANCE");
    println!("{}", "-".repeat(56));
    for account in accounts {
        println!(
            "{:>6}  {:<24} {:>8} {:>14}",
            account.id,
            truncate(&account.key, 24),
            account.client_id,
            format_cents(account.balance)
        );
    }
}

fn print_transactions(transactions: &[Transaction]) {
    if transactions.is_empty() {
        println!("No transactions found.");
        return;
    }
    println!(
        "{:>6}  {:<27} {:>6}  {:<20} {:>12}",
        "ID", "TIMESTAMP", "FROM", "TO", "AMOUNT"
    );
    println!("{}", "-".repeat(78));
    for tx in transactions {
        println!(
            "{:>6}  {:<27} {:>6}  {:<20} {:>12}",
            tx.id,
            timestamp::format(&tx.timestamp),
            tx.from_account,
            truncate(&tx.to_account, 20),
            format_cents(tx.amount)
        );
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}
