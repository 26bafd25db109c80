mod tui;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

use asha::api::{Backend, HttpBackend};
use asha::app::App;
use asha::config::Config;
use asha::dashboard::Dashboard;
use asha::identity::{IdentityResolver, LaunchAddress, Resolution};
use asha::models::{Identity, ResumeForm};
use asha::storage::{IdentityStore, SqliteStore};
use asha::voice::{CommandRecognizer, SpeechRecognizer, UnavailableRecognizer};

#[derive(Parser)]
#[command(name = "asha")]
#[command(about = "Terminal client for the Asha career assistant")]
struct Cli {
    /// Backend base URL (overrides ASHA_API_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Launch location, e.g. the URL an OAuth redirect landed on
    #[arg(long, global = true)]
    location: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the chat (default)
    Chat {
        /// Resume an existing conversation
        #[arg(long)]
        session: Option<String>,
    },

    /// Log in with an existing account
    Login { email: String },

    /// Create an account
    Signup { name: String, email: String },

    /// Complete Google sign-in from the redirected URL
    Callback { url: String },

    /// Forget the signed-in user
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Show the backend profile of the signed-in user
    Profile,

    /// Show saved jobs, documents and events
    Dashboard,

    /// Resume builder
    Resume {
        #[command(subcommand)]
        command: ResumeCommands,
    },

    /// Manage generated documents
    Documents {
        #[command(subcommand)]
        command: DocumentCommands,
    },

    /// Manage saved jobs
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Print the Google sign-in URL
    GoogleUrl,
}

#[derive(Subcommand)]
enum ResumeCommands {
    /// Generate a resume from a JSON form
    Submit { file: PathBuf },
}

#[derive(Subcommand)]
enum DocumentCommands {
    Rename { id: i64, name: String },
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum JobCommands {
    Delete { id: i64 },
}

pub(crate) fn read_resume_form(path: &Path) -> Result<ResumeForm> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a valid resume form", path.display()))
}

fn init_logging(config: &Config, verbose: bool, to_file: bool) -> Result<()> {
    if to_file {
        // The TUI owns the terminal, so logs go to the data dir
        let level = if verbose { "debug" } else { "info" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("cannot create {}", config.data_dir.display()))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(config.log_path())
            .with_context(|| format!("cannot open log file {}", config.log_path().display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        let level = if verbose { "debug" } else { "warn" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

fn signed_in(identities: &IdentityStore) -> Result<Identity> {
    identities
        .load_persisted()
        .context("Not signed in. Run `asha login EMAIL` or `asha signup NAME EMAIL` first.")
}

fn print_identity(identity: &Identity) {
    println!("Signed in as {} ({})", identity.display_name, identity.user_id);
    if !identity.email.is_empty() {
        println!("Email: {}", identity.email);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let location = cli
        .location
        .as_deref()
        .map(Url::parse)
        .transpose()
        .context("invalid --location URL")?;
    let config = Config::from_env(cli.base_url.as_deref(), location.as_ref()).context("invalid configuration")?;

    let command = cli.command.unwrap_or(Commands::Chat { session: None });
    init_logging(&config, cli.verbose, matches!(command, Commands::Chat { .. }))?;

    let backend = Arc::new(HttpBackend::new(config.base_url.clone()));
    let storage_path = config.storage_path();
    let store = SqliteStore::open(&storage_path)
        .with_context(|| format!("cannot open storage at {}", storage_path.display()))?;
    let mut identities = IdentityStore::new(Box::new(store));

    match command {
        Commands::Chat { session } => {
            let recognizer: Box<dyn SpeechRecognizer> = match &config.speech_command {
                Some(command) => Box::new(CommandRecognizer::new(command.clone())),
                None => Box::new(UnavailableRecognizer),
            };
            let google_url = backend.google_login_url();
            let mut address = LaunchAddress::new(location.unwrap_or_else(|| config.base_url.clone()));

            let (mut app, events) = App::new(backend, identities, recognizer, config.auth_prompt_delay);
            app.bootstrap(&mut address);
            if let Some(session_id) = session {
                app.switch_session(Some(&session_id));
            }
            tui::run_chat(app, events, google_url).await?;
        }

        Commands::Login { email } => {
            let user = backend.login(email.trim()).await.context("login failed")?;
            let identity = Identity::from_full_name(&user.user_id, &user.name, &email);
            identities.set(identity.clone());
            print_identity(&identity);
        }

        Commands::Signup { name, email } => {
            if name.trim().is_empty() || email.trim().is_empty() {
                bail!("Please fill in all fields.");
            }
            let user = backend
                .signup(name.trim(), email.trim())
                .await
                .context("signup failed")?;
            let identity = Identity::from_full_name(&user.user_id, &user.name, &email);
            identities.set(identity.clone());
            print_identity(&identity);
        }

        Commands::Callback { url } => {
            let url = Url::parse(&url).context("invalid callback URL")?;
            let mut address = LaunchAddress::new(url);
            match IdentityResolver::resolve(&mut address, &mut identities) {
                Resolution::Redirect(identity) => print_identity(&identity),
                _ => bail!("URL does not carry user_id, name and email"),
            }
        }

        Commands::Logout => {
            identities.clear();
            println!("Signed out.");
        }

        Commands::Whoami => match identities.load_persisted() {
            Some(identity) => print_identity(&identity),
            None => println!("Not signed in."),
        },

        Commands::Profile => {
            let identity = signed_in(&identities)?;
            let profile = backend
                .fetch_profile(&identity.user_id)
                .await
                .context("could not load profile")?;
            println!("Name:    {}", profile.name);
            println!("Email:   {}", profile.email);
            println!("Contact: {}", profile.contact.as_deref().unwrap_or("-"));
        }

        Commands::Dashboard => {
            let identity = signed_in(&identities)?;
            let mut dashboard = Dashboard::new();
            if let Some(notice) = dashboard.refresh(&*backend, &identity.user_id).await {
                bail!(notice);
            }
            let data = dashboard.data().cloned().unwrap_or_default();

            println!("SAVED JOBS");
            if data.saved_jobs.is_empty() {
                println!("  (none)");
            }
            for job in &data.saved_jobs {
                println!("  #{:<5} {} | {}", job.id, job.job_title, job.company_name);
                if let Some(link) = &job.apply_link {
                    println!("         {}", link);
                }
            }
            println!();
            println!("DOCUMENTS");
            if data.documents.is_empty() {
                println!("  (none)");
            }
            for doc in &data.documents {
                println!("  #{:<5} {}  {}", doc.id, doc.file_name, doc.download_url);
            }
            if !data.upcoming_events.is_empty() {
                println!();
                println!("UPCOMING EVENTS");
                for event in &data.upcoming_events {
                    println!("  {} - {}", event.event_date, event.title);
                }
            }
            if let Some(tip) = &data.career_tip {
                println!();
                println!("Tip: {}", tip.tip_text);
            }
        }

        Commands::Resume { command } => match command {
            ResumeCommands::Submit { file } => {
                let identity = signed_in(&identities)?;
                let form = read_resume_form(&file)?.cleaned(&identity.user_id);
                let submission = backend
                    .submit_resume(&form)
                    .await
                    .context("Failed to generate resume. Please try again.")?;
                if !submission.success {
                    bail!(if submission.message.is_empty() {
                        "Failed to generate resume. Please try again.".to_string()
                    } else {
                        submission.message
                    });
                }
                println!("Your resume is ready! Download it here: {}", submission.download_url);
                if let Some(id) = submission.resume_id {
                    println!("Resume #{}", id);
                }
            }
        },

        Commands::Documents { command } => {
            let identity = signed_in(&identities)?;
            let mut dashboard = Dashboard::new();
            match command {
                DocumentCommands::Rename { id, name } => {
                    if name.trim().is_empty() {
                        bail!("New name must not be empty");
                    }
                    if let Some(notice) = dashboard
                        .rename_document(&*backend, &identity.user_id, id, &name)
                        .await
                    {
                        bail!(notice);
                    }
                    println!("Renamed document #{} to {}", id, name.trim());
                }
                DocumentCommands::Delete { id } => {
                    if let Some(notice) = dashboard.delete_document(&*backend, &identity.user_id, id).await {
                        bail!(notice);
                    }
                    println!("Deleted document #{}", id);
                }
            }
        }

        Commands::Jobs { command } => match command {
            JobCommands::Delete { id } => {
                let identity = signed_in(&identities)?;
                let mut dashboard = Dashboard::new();
                if let Some(notice) = dashboard.delete_saved_job(&*backend, &identity.user_id, id).await {
                    bail!(notice);
                }
                println!("Deleted saved job #{}", id);
            }
        },

        Commands::GoogleUrl => {
            println!("{}", backend.google_login_url());
            println!("After signing in, run: asha callback '<redirected url>'");
        }
    }

    Ok(())
}
