use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agentmart::api::types::{
    Agent, AgentQuery, Credentials, NewAgentReview, Registration, ReviewPriority,
};
use agentmart::api::{AgentCatalog, AuthApi, CreditApi, RatingApi};
use agentmart::config::AppConfig;
use agentmart::error::AppError;
use agentmart::nav::{self, Page, Route};
use agentmart::shutdown::wait_for_shutdown;
use agentmart::state::AppState;
use agentmart::workflow::{self, types::ReviewOutcome};

#[derive(Parser)]
#[command(name = "agentmart", about = "Browse, run and review marketplace agents")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the session token
    Login {
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and log in
    Register {
        email: String,
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the logged-in account
    Whoami,
    /// List agents
    Agents {
        #[arg(short, long)]
        search: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        sort_by: Option<String>,
        #[arg(long)]
        creator: Option<String>,
        #[arg(long)]
        source: Option<String>,
        /// Only agents you have favorited
        #[arg(long)]
        favorites: bool,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Open a storefront route, e.g. /agents/<id> or /creators/<name>
    Open { path: String },
    /// Run an agent
    Run {
        agent_id: String,
        /// Input as key=value (repeatable)
        #[arg(short, long = "input")]
        inputs: Vec<String>,
    },
    /// Expert reviews of executions
    #[command(subcommand)]
    Review(ReviewCommand),
    /// Star ratings on agents
    #[command(subcommand)]
    Ratings(RatingsCommand),
    /// Credit balance and purchases
    #[command(subcommand)]
    Credits(CreditsCommand),
    /// Toggle an agent in your favorites
    Favorite { agent_id: String },
}

#[derive(Subcommand)]
enum ReviewCommand {
    /// Ask an expert to review an execution
    Request {
        execution_id: String,
        #[arg(short, long)]
        note: String,
        #[arg(short, long, value_enum)]
        priority: Option<PriorityArg>,
        /// Wait until the review finishes
        #[arg(short, long)]
        watch: bool,
    },
    /// Answer a review request (creators)
    Respond {
        execution_id: String,
        #[arg(short, long)]
        note: String,
        #[arg(short, long)]
        score: Option<u8>,
    },
    /// Wait for an open review to finish
    Watch { execution_id: String },
}

#[derive(Subcommand)]
enum RatingsCommand {
    List { agent_id: String },
    Add {
        agent_id: String,
        #[arg(short, long)]
        rating: u8,
        #[arg(short, long)]
        comment: Option<String>,
    },
}

#[derive(Subcommand)]
enum CreditsCommand {
    Buy { amount: i64 },
    History,
}

#[derive(Clone, Copy, ValueEnum)]
enum PriorityArg {
    Low,
    Normal,
    High,
}

impl From<PriorityArg> for ReviewPriority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Low => ReviewPriority::Low,
            PriorityArg::Normal => ReviewPriority::Normal,
            PriorityArg::High => ReviewPriority::High,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout is for command output
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    tracing::debug!(base_url = %config.api.base_url, "Loaded configuration");

    let state = AppState::new(config)?;
    let result = dispatch(&state, cli.command).await;
    if let Err(err) = &result {
        let expired = matches!(err.downcast_ref::<AppError>(), Some(AppError::Unauthorized(_)));
        if expired && !state.session.is_authenticated().await {
            eprintln!("Session expired. Run `agentmart login` to sign in again.");
        }
    }
    result
}

async fn dispatch(state: &AppState, command: Command) -> anyhow::Result<()> {
    let api = state.api.as_ref();

    match command {
        Command::Login { email, password } => {
            let token = api.login(&Credentials { email, password }).await?;
            state.session.set_token(token.access_token).await?;
            let user = api.me().await?;
            println!("Logged in as {} ({} credits)", user.username, user.credits);
            state.session.set_user(user).await?;
        }
        Command::Register {
            email,
            username,
            password,
        } => {
            let token = api
                .register(&Registration {
                    email,
                    username,
                    password,
                })
                .await?;
            state.session.set_token(token.access_token).await?;
            let user = api.me().await?;
            println!("Welcome, {}!", user.username);
            state.session.set_user(user).await?;
        }
        Command::Logout => {
            state.session.logout().await?;
            println!("Logged out");
        }
        Command::Whoami => match state.session.user().await {
            Some(_) => {
                let user = api.me().await?;
                println!("{} <{}>", user.username, user.email);
                println!("Credits: {}", user.credits);
                if user.is_creator {
                    println!("Creator account");
                }
                state.session.set_user(user).await?;
            }
            None => println!("Not logged in (guest {})", state.session.guest_id().await),
        },
        Command::Agents {
            search,
            category,
            sort_by,
            creator,
            source,
            favorites,
            limit,
        } => {
            let favorited_by = if favorites {
                match state.session.user().await {
                    Some(user) => Some(user.id),
                    None => anyhow::bail!("Log in to list favorites"),
                }
            } else {
                None
            };
            let query = AgentQuery {
                search,
                category,
                sort_by,
                creator_id: creator,
                favorited_by,
                source,
                limit: Some(limit),
            };
            let page = api.list_agents(&query).await?;
            state.agents.insert_page(&page.items).await;
            if page.items.is_empty() {
                println!("No agents found");
            }
            for agent in &page.items {
                print_agent_line(agent);
            }
            if let Some(total) = page.total {
                println!("\n{} of {total} agents", page.items.len());
            }
        }
        Command::Open { path } => {
            let route = Route::parse(&path);
            let page = nav::resolve(&route, api, api, &state.agents).await?;
            print_page(state, &page).await?;
        }
        Command::Run { agent_id, inputs } => {
            let inputs = workflow::run::parse_inputs(&inputs)?;
            let report = workflow::run::run_agent(api, &agent_id, &inputs).await?;
            println!("{}", report.rendered);
            if let Some(refined) = &report.refined {
                println!("\n--- Refined by expert ---\n{refined}");
            }
            println!("\nExecution: {}", report.execution.id);
        }
        Command::Review(ReviewCommand::Request {
            execution_id,
            note,
            priority,
            watch,
        }) => {
            if watch {
                println!("Waiting for review (Ctrl+C to stop)...");
            }
            let outcome = workflow::review::request_review(
                api,
                &state.poller(),
                &execution_id,
                &note,
                priority.map(Into::into),
                watch,
                wait_for_shutdown(),
            )
            .await?;
            print_review_outcome(&outcome);
        }
        Command::Review(ReviewCommand::Respond {
            execution_id,
            note,
            score,
        }) => {
            let execution =
                workflow::review::respond_review(api, &execution_id, &note, score).await?;
            println!(
                "Response submitted; review is now {}",
                execution.review_status
            );
        }
        Command::Review(ReviewCommand::Watch { execution_id }) => {
            println!("Waiting for review (Ctrl+C to stop)...");
            let outcome = workflow::review::watch_review(
                api,
                &state.poller(),
                &execution_id,
                wait_for_shutdown(),
            )
            .await?;
            print_review_outcome(&outcome);
        }
        Command::Ratings(RatingsCommand::List { agent_id }) => {
            let reviews = api.list_reviews(&agent_id).await?;
            if reviews.is_empty() {
                println!("No ratings yet");
            }
            for review in reviews {
                let stars = "*".repeat(usize::from(review.rating.min(5)));
                println!(
                    "{stars:<5} {} {}",
                    review.username.as_deref().unwrap_or("anonymous"),
                    review.comment.as_deref().unwrap_or_default()
                );
            }
        }
        Command::Ratings(RatingsCommand::Add {
            agent_id,
            rating,
            comment,
        }) => {
            let review = api
                .create_review(&NewAgentReview {
                    agent_id,
                    rating,
                    comment,
                })
                .await?;
            println!("Rated {} stars", review.rating);
        }
        Command::Credits(CreditsCommand::Buy { amount }) => {
            let balance = api.purchase_credits(amount).await?;
            println!("Balance: {} credits", balance.balance);
        }
        Command::Credits(CreditsCommand::History) => {
            let transactions = api.list_transactions().await?;
            if transactions.is_empty() {
                println!("No transactions");
            }
            for tx in transactions {
                let when = tx
                    .created_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{when:<16} {:>+8} {:<10} {}",
                    tx.amount,
                    tx.kind,
                    tx.description.as_deref().unwrap_or_default()
                );
            }
        }
        Command::Favorite { agent_id } => {
            state.load_favorites().await?;
            let favorited = state.favorites.toggle(api, &agent_id).await?;
            state.agents.invalidate(&agent_id).await;
            if favorited {
                println!("Added {agent_id} to favorites");
            } else {
                println!("Removed {agent_id} from favorites");
            }
        }
    }

    Ok(())
}

fn print_agent_line(agent: &Agent) {
    let rating = agent
        .rating
        .map(|r| format!("{r:.1}*"))
        .unwrap_or_else(|| "-".to_string());
    let price = agent
        .price_credits
        .map(|p| format!("{p} cr"))
        .unwrap_or_else(|| "free".to_string());
    println!("{:<24} {:<32} {rating:>5} {price:>8}", agent.id, agent.name);
}

async fn print_page(state: &AppState, page: &Page) -> anyhow::Result<()> {
    match page {
        Page::Agent(agent) => {
            println!("# {}\n", agent.name);
            if let Some(creator) = &agent.creator_username {
                println!("by {creator}");
            }
            if !agent.description.is_empty() {
                println!("{}\n", agent.description);
            }
            let reviews = state.api.list_reviews(&agent.id).await?;
            if !reviews.is_empty() {
                let avg = reviews.iter().map(|r| f64::from(r.rating)).sum::<f64>()
                    / reviews.len() as f64;
                println!("Rating: {avg:.1} ({} reviews)", reviews.len());
            }
        }
        Page::Creator(creator) => {
            println!("# {}\n", creator.username);
            if let Some(bio) = &creator.bio {
                println!("{bio}\n");
            }
            for agent in &creator.agents {
                print_agent_line(agent);
            }
        }
        Page::Execution(execution) => {
            let report = workflow::run::report((**execution).clone());
            println!("{}", report.rendered);
            if let Some(refined) = &report.refined {
                println!("\n--- Refined by expert ---\n{refined}");
            }
            println!("\nReview: {}", execution.review_status);
        }
        Page::NotFound { path } => println!("Page not found: {path}"),
        Page::Home | Page::Browse => println!("Try `agentmart agents` to browse listings"),
        Page::Dashboard => println!("Try `agentmart agents --creator <id>` and `agentmart review respond`"),
        Page::Credits => println!("Try `agentmart credits history` or `agentmart credits buy <amount>`"),
        Page::Login => println!("Try `agentmart login <email> --password <password>`"),
        Page::Register => println!("Try `agentmart register <email> <username> --password <password>`"),
    }
    Ok(())
}

fn print_review_outcome(outcome: &ReviewOutcome) {
    match outcome {
        ReviewOutcome::Requested { execution } => {
            println!("Review requested; status: {}", execution.review_status);
            println!("Run `agentmart review watch {}` to follow it", execution.id);
        }
        ReviewOutcome::Completed { update, rendered } => {
            println!("Review completed for {}\n", update.execution_id);
            if let Some(note) = &update.review_note {
                println!("Reviewer note: {note}\n");
            }
            println!("{rendered}");
        }
        ReviewOutcome::Rejected { note } => {
            println!("Review rejected");
            if let Some(note) = note {
                println!("Reason: {note}");
            }
        }
        ReviewOutcome::Cancelled => println!("Stopped watching"),
        ReviewOutcome::NotPending { execution } => {
            println!("No open review on {} ({})", execution.id, execution.review_status);
        }
    }
}
