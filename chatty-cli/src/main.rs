use anyhow::{anyhow, bail, Context, Result};
use chatty_core::config::Config;
use chatty_core::core_board::{BulletinBoard, ChannelRecord, MemoryBoard};
use chatty_core::core_crypto::RandomSource;
use chatty_core::core_invite::{Decision, InviteExchange, JoinOutcome};
use chatty_core::core_session::{compose, open_record, read_feed, send_message, FeedItem, IvPolicy, Session};
use chatty_core::core_vault::{GroupId, LocalVault, PendingStore, VaultSession};
use chatty_core::logging::{init_logging_with_config, LogConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "chatty")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file; CHATTY_* environment variables are used otherwise
    #[arg(short, long, env = "CHATTY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the vault directory (`~` is expanded)
    #[arg(long)]
    data_dir: Option<String>,

    /// Vault password
    #[arg(long, env = "CHATTY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// IV policy for encrypt/decrypt (group_static, per_message)
    #[arg(long)]
    iv_policy: Option<IvPolicy>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the vault on first use, or check the password
    Unlock,
    /// List the groups in the vault
    Groups,
    /// Create a group with fresh key material
    CreateGroup {
        /// Display name; blank becomes "No Name"
        #[arg(default_value = "")]
        name: String,
    },
    /// Encrypt a message for a group
    Encrypt {
        #[arg(short, long)]
        group: String,
        text: String,
    },
    /// Decrypt a message from a group
    Decrypt {
        #[arg(short, long)]
        group: String,
        ciphertext: String,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
    /// Run a two-device invite handshake on an in-memory board
    Demo {
        /// Answer the join request with a rejection
        #[arg(long)]
        reject: bool,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => Config::from_env()?,
    };
    if let Some(dir) = &args.data_dir {
        config.vault.data_dir = PathBuf::from(shellexpand::tilde(dir).into_owned());
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.to_lowercase();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    if let Some(policy) = args.iv_policy {
        config.messages.iv_policy = policy;
    }
    config.validate()?;
    Ok(config)
}

fn password(args: &Args) -> Result<&str> {
    args.password
        .as_deref()
        .ok_or_else(|| anyhow!("a password is required (--password or CHATTY_PASSWORD)"))
}

struct Opened {
    store: LocalVault,
    vault: VaultSession,
    session: Session,
    random: RandomSource,
}

fn open_vault(config: &Config, password: &str) -> Result<Opened> {
    let random = RandomSource::os();
    let store = LocalVault::open(&config.vault, random.clone())?;
    let vault = store.open_session(password)?;
    let session = Session::new(store.device_id()?, config.messages.iv_policy);
    Ok(Opened { store, vault, session, random })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging_with_config(LogConfig::from_config(&config.logging)?)?;
    chatty_core::metrics::init_metrics();
    debug!(data_dir = %config.vault.data_dir.display(), "Configuration loaded");

    match &args.command {
        Command::Unlock => {
            let opened = open_vault(&config, password(&args)?)?;
            println!(
                "Vault at {} unlocked: {} group(s), device {}",
                opened.store.dir().display(),
                opened.vault.vault()?.len(),
                opened.session.device_id()
            );
        }
        Command::Groups => {
            let opened = open_vault(&config, password(&args)?)?;
            for group in opened.vault.vault()?.groups() {
                println!("{}  {}", group.group_id, group.display_name);
            }
        }
        Command::CreateGroup { name } => {
            let mut opened = open_vault(&config, password(&args)?)?;
            let record = opened.session.create_group(&mut opened.vault, name, &opened.random)?;
            println!("{}  {}", record.group_id, record.display_name);
        }
        Command::Encrypt { group, text } => {
            let mut opened = open_vault(&config, password(&args)?)?;
            opened.session.select(&opened.vault, &GroupId::new(group.as_str()))?;
            let record = compose(&opened.session, &opened.vault, text, &opened.random)?;
            println!("{}", record.content);
        }
        Command::Decrypt { group, ciphertext } => {
            let mut opened = open_vault(&config, password(&args)?)?;
            opened.session.select(&opened.vault, &GroupId::new(group.as_str()))?;
            let group = opened.session.current_group(&opened.vault)?;
            let record = ChannelRecord {
                content: ciphertext.trim().to_string(),
                author: opened.session.device_id().to_string(),
            };
            match open_record(&opened.session, group, "cli", record) {
                FeedItem::Message { text, .. } => println!("{}", text),
                _ => bail!("ciphertext does not decrypt under group {}", group.group_id),
            }
        }
        Command::ShowConfig => {
            let rendered = toml::to_string_pretty(&config)?;
            print!("{}", rendered);
        }
        Command::Demo { reject } => run_demo(&config, *reject).await?,
    }

    Ok(())
}

struct DemoDevice {
    _dir: tempfile::TempDir,
    opened: Opened,
    exchange: InviteExchange,
}

impl DemoDevice {
    fn new(config: &Config, board: &MemoryBoard) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let mut vault_config = config.vault.clone();
        vault_config.data_dir = dir.path().to_path_buf();
        let device_config = Config { vault: vault_config, ..config.clone() };

        let opened = open_vault(&device_config, "demo password")?;
        let board: Arc<dyn BulletinBoard> = Arc::new(board.clone());
        let exchange = InviteExchange::new(
            board,
            PendingStore::open(dir.path())?,
            opened.random.clone(),
            config.invite.clone(),
        );
        Ok(Self { _dir: dir, opened, exchange })
    }
}

async fn run_demo(config: &Config, reject: bool) -> Result<()> {
    let board = MemoryBoard::new();
    let mut alice = DemoDevice::new(config, &board)?;
    let mut bob = DemoDevice::new(config, &board)?;

    let group = alice
        .opened
        .session
        .create_group(&mut alice.opened.vault, "Demo Group", &alice.opened.random)?;
    let code = alice.exchange.issue_code(&alice.opened.session, &alice.opened.vault).await?;
    println!("alice: created {:?} and issued invite code {}", group.display_name, code);

    bob.exchange.request_join(&bob.opened.vault, code.as_str()).await?;
    println!("bob:   requested to join with {}", code);

    let requests = alice.exchange.incoming_requests(&group.group_id).await?;
    let request = requests
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("join request did not arrive"))?;
    let decision = if reject { Decision::Reject } else { Decision::Accept };
    alice.exchange.respond(&alice.opened.vault, &request, decision).await?;
    println!("alice: answered {:?}", decision);

    match bob.exchange.wait_for_response(&mut bob.opened.vault, &code).await? {
        JoinOutcome::Denied { group_name, .. } => {
            println!("bob:   request to join {:?} was denied", group_name);
        }
        JoinOutcome::Joined { group_id, group_name } => {
            println!("bob:   joined {:?}", group_name);
            bob.opened.session.select(&bob.opened.vault, &group_id)?;
            send_message(
                &board,
                &bob.opened.session,
                &bob.opened.vault,
                "hello from bob",
                &bob.opened.random,
            )
            .await?;

            for item in read_feed(&board, &alice.opened.session, &alice.opened.vault).await? {
                if let FeedItem::Message { text, author, .. } = item {
                    println!("alice: read {:?} from {}", text, author);
                }
            }
        }
    }

    info!("Demo finished");
    Ok(())
}
