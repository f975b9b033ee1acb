use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use portal::admin::{self, AdminError, DirectoryQuery, DirectoryStats, ReviewDecision, SortField, SortOrder, StatusFilter};
use portal::config::{ConfigError, PortalConfig};
use portal::flows::{self, FlowError, LoginPortal, ResendCooldown};
use portal::holder::SessionHolder;
use portal::identity::{IdentityError, IdentityProvider, RestIdentityProvider, Uid};
use portal::navigation::{Navigation, navigate};
use portal::routes::RouteTable;
use portal::session::Session;
use portal::store::{FirestoreProfileStore, ProfileStore, StoreError};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("admin credentials not configured; set PORTAL_ADMIN_EMAIL and PORTAL_ADMIN_PASSWORD")]
    SeedNotConfigured,
    #[error("{0}")]
    Identity(#[from] IdentityError),
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Flow(#[from] FlowError),
    #[error("{0}")]
    Admin(#[from] AdminError),
}

#[derive(Parser, Debug)]
#[command(name = "portal", about = "Membership portal access and administration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision the configured administrator account.
    SeedAdmin,
    /// Sign in and report what a visit to PATH would show.
    Check {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PORTAL_CHECK_PASSWORD")]
        password: String,
        #[arg(long, value_enum, default_value_t = PortalArg::Member)]
        portal: PortalArg,
        #[arg(default_value = "/dashboard")]
        path: String,
    },
    /// Sign in to an unverified account and send another verification message.
    ResendVerification {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PORTAL_CHECK_PASSWORD")]
        password: String,
    },
    /// List registrations (administrator credentials required).
    Users {
        #[arg(long, default_value = "all", value_parser = parse_status_filter)]
        status: StatusFilter,
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, value_enum, default_value_t = SortArg::Created)]
        sort: SortArg,
        #[arg(long, default_value_t = false)]
        asc: bool,
    },
    /// Approve or reject a registration (administrator credentials required).
    Review {
        uid: String,
        #[arg(value_enum)]
        decision: DecisionArg,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PortalArg {
    Member,
    Admin,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortArg {
    Name,
    Email,
    Jurisdiction,
    Status,
    Created,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DecisionArg {
    Approve,
    Reject,
}

fn parse_status_filter(raw: &str) -> Result<StatusFilter, String> {
    StatusFilter::parse(raw).ok_or_else(|| format!("unknown status `{raw}`; expected all, pending, approved or rejected"))
}

struct Portal {
    config: PortalConfig,
    provider: Arc<RestIdentityProvider>,
    store: Arc<FirestoreProfileStore>,
}

impl Portal {
    fn connect(config: PortalConfig) -> Result<Self, CliError> {
        let provider = Arc::new(RestIdentityProvider::new(
            &config.identity_base_url,
            &config.api_key,
            config.timeouts.request(),
            config.timeouts.connect(),
        )?);
        let store = FirestoreProfileStore::new(
            &config.store_base_url,
            &config.project_id,
            &config.api_key,
            config.timeouts.request(),
            config.timeouts.connect(),
        )?
        .with_token_source(Arc::clone(&provider));
        Ok(Self { config, provider, store: Arc::new(store) })
    }

    async fn sign_in_admin(&self) -> Result<(), CliError> {
        let seed = self.config.admin_seed().ok_or(CliError::SeedNotConfigured)?;
        flows::login(
            self.provider.as_ref(),
            self.store.as_ref(),
            LoginPortal::Administrator,
            &seed.email,
            &seed.password,
            self.config.admin_domain.as_deref(),
        )
        .await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let portal = Portal::connect(PortalConfig::from_env()?)?;

    match cli.command {
        Command::SeedAdmin => run_seed_admin(&portal).await,
        Command::Check { email, password, portal: which, path } => {
            run_check(&portal, which, &email, &password, &path).await
        }
        Command::ResendVerification { email, password } => run_resend_verification(&portal, &email, &password).await,
        Command::Users { status, search, sort, asc } => run_users(&portal, status, search, sort, asc).await,
        Command::Review { uid, decision } => run_review(&portal, &Uid::new(uid), decision).await,
    }
}

async fn run_seed_admin(portal: &Portal) -> Result<(), CliError> {
    let seed = portal.config.admin_seed().ok_or(CliError::SeedNotConfigured)?;
    let identity = admin::seed_admin(
        portal.provider.as_ref(),
        portal.store.as_ref(),
        &seed,
        portal.config.seed_retry(),
    )
    .await?;
    println!("admin ready: {} ({})", identity.email, identity.uid);
    Ok(())
}

async fn run_check(portal: &Portal, which: PortalArg, email: &str, password: &str, path: &str) -> Result<(), CliError> {
    let login_portal = match which {
        PortalArg::Member => LoginPortal::Member,
        PortalArg::Admin => LoginPortal::Administrator,
    };
    let landing = flows::login(
        portal.provider.as_ref(),
        portal.store.as_ref(),
        login_portal,
        email,
        password,
        portal.config.admin_domain.as_deref(),
    )
    .await?;

    let holder = SessionHolder::spawn(portal.provider.clone(), portal.store.clone());
    let session = holder.resolved().await;
    holder.shutdown().await;

    print_session(&session);
    println!("landing: {landing}");
    match navigate(&session, &RouteTable::standard(), path) {
        Navigation::Loading => println!("{path}: loading"),
        Navigation::Render(page) => println!("{path}: render {page:?}"),
        Navigation::Redirect { to, from: Some(from) } => println!("{path}: redirect to {to} (from {from})"),
        Navigation::Redirect { to, from: None } => println!("{path}: redirect to {to}"),
    }

    flows::sign_out(portal.provider.as_ref()).await?;
    Ok(())
}

async fn run_resend_verification(portal: &Portal, email: &str, password: &str) -> Result<(), CliError> {
    let identity = portal.provider.sign_in(email, password).await?;
    if identity.email_verified {
        flows::sign_out(portal.provider.as_ref()).await?;
        println!("{email} is already verified");
        return Ok(());
    }

    let mut cooldown = ResendCooldown::new(portal.config.resend_cooldown());
    let now = Instant::now();
    let sent = flows::resend_verification(portal.provider.as_ref(), &mut cooldown, now).await;
    flows::sign_out(portal.provider.as_ref()).await?;
    sent?;

    let wait = cooldown.remaining(now).map_or(0, |d| d.as_secs());
    println!("verification sent to {email}; next resend allowed in {wait}s");
    Ok(())
}

fn print_session(session: &Session) {
    match &session.identity {
        Some(identity) => println!("identity: {} verified={}", identity.email, identity.email_verified),
        None => println!("identity: none"),
    }
    match session.profile {
        Some(p) => println!("profile: role={} status={}", p.role.as_str(), p.status.as_str()),
        None => println!("profile: none"),
    }
    if let Some(error) = &session.error {
        println!("error: {error}");
    }
}

async fn run_users(
    portal: &Portal,
    status: StatusFilter,
    search: String,
    sort: SortArg,
    asc: bool,
) -> Result<(), CliError> {
    portal.sign_in_admin().await?;
    let listed = portal.store.list().await;
    flows::sign_out(portal.provider.as_ref()).await?;
    let profiles = listed?;

    let sort = match sort {
        SortArg::Name => SortField::FullName,
        SortArg::Email => SortField::Email,
        SortArg::Jurisdiction => SortField::PrimaryJurisdiction,
        SortArg::Status => SortField::Status,
        SortArg::Created => SortField::CreatedAt,
    };
    let order = if asc { SortOrder::Asc } else { SortOrder::Desc };
    let query = DirectoryQuery { search, status, sort, order };

    for p in query.apply(&profiles) {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            p.id,
            p.status.as_str(),
            p.full_name,
            p.email,
            p.primary_jurisdiction,
            p.created_at.date()
        );
    }

    let stats = DirectoryStats::from_profiles(&profiles);
    println!(
        "total={} pending={} approved={} rejected={}",
        stats.total, stats.pending, stats.approved, stats.rejected
    );
    Ok(())
}

async fn run_review(portal: &Portal, uid: &Uid, decision: DecisionArg) -> Result<(), CliError> {
    let decision = match decision {
        DecisionArg::Approve => ReviewDecision::Approve,
        DecisionArg::Reject => ReviewDecision::Reject,
    };
    portal.sign_in_admin().await?;
    let reviewed = admin::review(portal.store.as_ref(), uid, decision).await;
    flows::sign_out(portal.provider.as_ref()).await?;
    reviewed?;
    println!("{uid}: {}", decision.status().as_str());
    Ok(())
}
