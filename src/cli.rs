use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "concilia")]
#[command(about = "Bank-transfer reconciliation and funds-release ledger", long_about = None)]
pub struct Cli {
    /// Override Concilia home directory (config/data subdirs will be created inside it).
    #[arg(long, env = "CONCILIA_HOME")]
    pub home: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Merchant(MerchantArgs),
    Credit(CreditArgs),
    Receipt(ReceiptArgs),
    Match(MatchArgs),
    Movement(MovementArgs),
    Ledger(LedgerArgs),
    Balance(BalanceArgs),
}

#[derive(Debug, Args)]
pub struct MerchantArgs {
    #[command(subcommand)]
    pub cmd: MerchantCmd,
}

#[derive(Debug, Subcommand)]
pub enum MerchantCmd {
    Add {
        name: String,

        #[arg(long)]
        tax_id: Option<String>,

        /// Commission percentage applied to matched credits.
        #[arg(long, default_value = "0")]
        commission: String,

        /// Funds-release hold in hours (24, 48, 72 or 96).
        #[arg(long, default_value_t = 24)]
        hold_hours: u32,
    },
    List {
        /// Include deactivated merchants.
        #[arg(long)]
        all: bool,
    },
    Update {
        id: String,

        #[arg(long)]
        commission: Option<String>,

        #[arg(long)]
        hold_hours: Option<u32>,
    },
    Deactivate {
        id: String,
    },
}

#[derive(Debug, Args)]
pub struct CreditArgs {
    #[command(subcommand)]
    pub cmd: CreditCmd,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SourceArg {
    Webhook,
    Import,
}

#[derive(Debug, Subcommand)]
pub enum CreditCmd {
    /// Record an incoming bank transfer notification.
    Add {
        /// Bank-assigned transaction id; repeats are rejected.
        external_id: String,

        amount: String,

        /// Bank event timestamp (RFC3339).
        #[arg(long)]
        at: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        tax_id: Option<String>,

        #[arg(long, value_enum, default_value = "webhook")]
        source: SourceArg,
    },
    List {
        #[arg(long)]
        unmatched: bool,
    },
}

#[derive(Debug, Args)]
pub struct ReceiptArgs {
    #[command(subcommand)]
    pub cmd: ReceiptCmd,
}

#[derive(Debug, Subcommand)]
pub enum ReceiptCmd {
    /// Record a reported payment and try to reconcile it.
    Add {
        amount: String,

        /// Declared payment timestamp (RFC3339).
        #[arg(long)]
        at: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        tax_id: Option<String>,

        #[arg(long)]
        merchant: Option<String>,
    },
    List {
        #[arg(long)]
        pending: bool,
    },
    /// Expire old pending receipts per the configured policy.
    Expire {
        /// Override the configured expiry age.
        #[arg(long)]
        days: Option<u32>,
    },
}

#[derive(Debug, Args)]
pub struct MatchArgs {
    #[command(subcommand)]
    pub cmd: MatchCmd,
}

#[derive(Debug, Subcommand)]
pub enum MatchCmd {
    /// Manually link a receipt to a credit.
    Set {
        receipt_id: String,
        credit_id: String,

        /// Required when the receipt carries no merchant.
        #[arg(long)]
        merchant: Option<String>,
    },
    /// Sever an existing link, returning both records to the pool.
    Unset { credit_id: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DirectionArg {
    Egreso,
    Credito,
}

#[derive(Debug, Args)]
pub struct MovementArgs {
    #[command(subcommand)]
    pub cmd: MovementCmd,
}

#[derive(Debug, Subcommand)]
pub enum MovementCmd {
    Add {
        merchant_id: String,

        #[arg(value_enum)]
        direction: DirectionArg,

        amount: String,

        /// Mark an inflow as a deposit, subject to the release hold.
        #[arg(long)]
        deposito: bool,

        #[arg(long)]
        concept: Option<String>,

        /// Effective timestamp (RFC3339). Defaults to now.
        #[arg(long)]
        at: Option<String>,
    },
    List {
        merchant_id: String,
    },
    Delete {
        movement_id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortFieldArg {
    EffectiveAt,
    Amount,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortOrderArg {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EntryKindArg {
    Credit,
    Receipt,
    ManualInflow,
    ManualOutflow,
}

#[derive(Debug, Args)]
pub struct LedgerArgs {
    #[command(subcommand)]
    pub cmd: LedgerCmd,
}

#[derive(Debug, Subcommand)]
pub enum LedgerCmd {
    /// Recompute running balances from the raw movement tables.
    Rebuild {
        #[arg(long, conflicts_with = "all")]
        merchant: Option<String>,

        /// Rebuild every merchant.
        #[arg(long)]
        all: bool,
    },
    List {
        merchant_id: String,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 50)]
        page_size: u32,

        #[arg(long, value_enum, default_value = "effective-at")]
        sort_by: SortFieldArg,

        #[arg(long, value_enum, default_value = "asc")]
        order: SortOrderArg,

        /// Filter by entry kind.
        #[arg(long = "type", value_enum)]
        kind: Option<EntryKindArg>,

        /// Lower bound on effective timestamp (RFC3339).
        #[arg(long)]
        from: Option<String>,

        /// Upper bound on effective timestamp (RFC3339).
        #[arg(long)]
        to: Option<String>,
    },
    /// Compare cached entry counts against the live movement tables.
    Verify { merchant_id: String },
}

#[derive(Debug, Args)]
pub struct BalanceArgs {
    pub merchant_id: String,

    /// Show the per-deposit release diagnostic.
    #[arg(long)]
    pub detail: bool,

    /// Balance at a past moment (RFC3339), read from the ledger cache.
    #[arg(long)]
    pub as_of: Option<String>,
}
