//! Application state and navigation.
//!
//! Every view is reached through [`App::navigate`], which asks the route
//! guard what to do with the current session before rendering anything.

use std::future::Future;
use std::io::{self, Write};

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use sitescout_core::auth::{evaluate, post_login_destination, ReturnPolicy, TokenStore};
use sitescout_core::models::{
    Credentials, JobHistory, ProjectRequirements, RecommendationResponse, Registration,
};
use sitescout_core::{ApiClient, ApiError, Config, GuardDecision, Route, SessionController};

use crate::views;

// ============================================================================
// Constants
// ============================================================================

/// Maximum username length
const MAX_USERNAME_LENGTH: usize = 50;

/// Maximum password length
const MAX_PASSWORD_LENGTH: usize = 128;

/// Maximum concurrent history detail requests
const MAX_CONCURRENT_REQUESTS: usize = 5;

/// Guard hops allowed before navigation gives up
const MAX_REDIRECTS: usize = 4;

/// Username supplied non-interactively
const USERNAME_ENV: &str = "SITESCOUT_USERNAME";

/// Password supplied non-interactively
const PASSWORD_ENV: &str = "SITESCOUT_PASSWORD";

/// Message shown when the backend rejects the bearer token mid-session
const SESSION_ENDED_MESSAGE: &str = "Your session has ended. Please sign in again.";

type Session = SessionController<Box<dyn TokenStore>, ApiClient>;

/// What a view command carries besides its route.
#[derive(Debug, Clone, Default)]
pub struct ViewRequest {
    /// Constraints for a new analysis on the site-selection view
    pub requirements: Option<ProjectRequirements>,
    /// Fetch the results of every past analysis on the history view
    pub expand_history: bool,
}

/// Command-line settings for this run only. Never written to the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub default_landing: bool,
}

impl Overrides {
    fn api_base_url(&self, config: &Config) -> String {
        config.resolved_api_base_url(self.api_url.as_deref())
    }

    fn return_policy(&self, config: &Config) -> ReturnPolicy {
        if self.default_landing {
            ReturnPolicy::DefaultRoute
        } else {
            config.return_policy
        }
    }
}

pub struct App {
    config: Config,
    return_policy: ReturnPolicy,
    api: ApiClient,
    session: Session,
}

impl App {
    pub fn new(config: Config, overrides: &Overrides) -> Result<Self> {
        let api = ApiClient::new(overrides.api_base_url(&config))?;
        let store = config.open_token_store()?;
        let session = SessionController::new(store, api.clone());
        let return_policy = overrides.return_policy(&config);
        debug!(base_url = api.base_url(), policy = ?return_policy, "App initialized");
        Ok(Self {
            config,
            return_policy,
            api,
            session,
        })
    }

    // ===== Navigation =====

    /// Resolve `requested` through the guard and render whatever it settles on.
    pub async fn navigate(&mut self, requested: Route, request: &ViewRequest) -> Result<()> {
        let mut route = requested;

        for _ in 0..MAX_REDIRECTS {
            self.session.check_expiry();
            let decision = evaluate(&self.session.snapshot(), &route);
            debug!(route = %route, decision = ?decision, "Guard evaluated");

            match decision {
                GuardDecision::Loading => {
                    println!("Loading...");
                    self.session.reload();
                }
                GuardDecision::Redirect { to: Route::Login, from } => {
                    if let Some(ref origin) = from {
                        println!("Sign in to view {}.", origin.title());
                    }
                    self.login_interactive(None).await?;
                    route = post_login_destination(from.as_ref(), self.return_policy);
                }
                GuardDecision::Redirect { to, .. } => route = to,
                GuardDecision::Render => return self.render(&route, request).await,
            }
        }

        bail!("Too many redirects while opening {}", route.path())
    }

    async fn render(&self, route: &Route, request: &ViewRequest) -> Result<()> {
        match route {
            Route::Login => {
                match self.session.user() {
                    Some(user) => println!("Already signed in as {}.", user.username),
                    None => println!("Not signed in."),
                }
                Ok(())
            }
            Route::SiteSelection => match request.requirements {
                Some(ref requirements) => self.show_recommendations(requirements).await,
                None => {
                    print!("{}", views::render_empty_analysis());
                    Ok(())
                }
            },
            Route::History => self.show_history(request.expand_history).await,
            Route::HistoryDetail(id) => self.show_history_detail(id).await,
            Route::Profile => self.show_profile().await,
            Route::NotFound(path) => {
                println!("No page at {}.", path);
                Ok(())
            }
            Route::Root | Route::Dashboard => Err(anyhow!("{} is always redirected", route.path())),
        }
    }

    // ===== Views =====

    async fn show_recommendations(&self, requirements: &ProjectRequirements) -> Result<()> {
        requirements.validate()?;
        info!(title = %requirements.title, "Running site analysis");
        println!("Analysing sites for \"{}\"...", requirements.title);

        let results = self
            .fetch(|api| async move { api.recommend_sites(requirements).await })
            .await?;
        if let Some(results) = results {
            print!("{}", views::render_recommendations(&results));
        }
        Ok(())
    }

    async fn show_history(&self, expand: bool) -> Result<()> {
        let Some(history) = self.fetch(|api| async move { api.fetch_history().await }).await? else {
            return Ok(());
        };
        print!("{}", views::render_history(&history));

        if expand && !history.is_empty() {
            let api = self.authorized_api()?;
            for (job, result) in fetch_history_details(&api, history).await {
                println!();
                println!("== {} ({}) ==", job.title, job.id);
                match result {
                    Ok(results) => print!("{}", views::render_recommendations(&results)),
                    Err(e) if e.is_unauthorized() => return Err(self.end_session(e)),
                    Err(e) => println!("Failed to load results: {}", e),
                }
            }
        }
        Ok(())
    }

    async fn show_history_detail(&self, id: &str) -> Result<()> {
        let results = self
            .fetch(|api| async move { api.fetch_history_detail(id).await })
            .await?;
        if let Some(results) = results {
            print!("{}", views::render_recommendations(&results));
        }
        Ok(())
    }

    async fn show_profile(&self) -> Result<()> {
        let profile = match self.fetch(|api| async move { api.fetch_profile().await }).await {
            Ok(profile) => profile,
            Err(e) if !self.session.is_authenticated() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Profile fetch failed, showing token identity");
                None
            }
        };
        print!(
            "{}",
            views::render_profile(profile.as_ref(), self.session.user().as_ref())
        );
        Ok(())
    }

    // ===== Authenticated requests =====

    fn authorized_api(&self) -> Result<ApiClient> {
        let token = self
            .session
            .bearer_token()
            .ok_or_else(|| anyhow!("Not signed in"))?;
        Ok(self.api.with_token(token))
    }

    /// Run an authenticated request.
    ///
    /// Returns `Ok(None)` when the session changed while the request was in
    /// flight, so a response for a previous user is never shown. A 401 ends
    /// the session.
    async fn fetch<T, F, Fut>(&self, request: F) -> Result<Option<T>>
    where
        F: FnOnce(ApiClient) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let api = self.authorized_api()?;
        let revision = self.session.snapshot().revision;

        match request(api).await {
            Ok(value) if self.session.snapshot().revision == revision => Ok(Some(value)),
            Ok(_) => {
                warn!(revision, "Discarding response from a previous session");
                Ok(None)
            }
            Err(e) if e.is_unauthorized() => Err(self.end_session(e)),
            Err(e) => Err(e.into()),
        }
    }

    fn end_session(&self, e: ApiError) -> anyhow::Error {
        warn!(error = %e, "Backend rejected the session token");
        self.session.logout();
        anyhow!(SESSION_ENDED_MESSAGE)
    }

    // ===== Authentication =====

    /// Prompt for credentials and sign in.
    pub async fn login_interactive(&mut self, username: Option<String>) -> Result<()> {
        println!("\n=== SiteScout Login ===\n");

        let username = match username.or_else(|| env_value(USERNAME_ENV)) {
            Some(name) => name,
            None => prompt_username(self.config.last_username.as_deref())?,
        };
        let password = match env_value(PASSWORD_ENV) {
            Some(password) => password,
            None => prompt_password()?,
        };
        validate_credentials(&username, &password)?;

        println!("\nAuthenticating...");
        self.login(Credentials::new(username, password)).await?;
        println!("Login successful!\n");
        Ok(())
    }

    /// Create an account, then sign in with the same credentials.
    pub async fn register(&mut self, mut registration: Registration) -> Result<()> {
        if registration.password.is_empty() {
            registration.password = match env_value(PASSWORD_ENV) {
                Some(password) => password,
                None => prompt_new_password()?,
            };
        }
        validate_credentials(&registration.username, &registration.password)?;

        if let Err(e) = self.session.register(&registration).await {
            error!(error = %e, "Registration failed");
            bail!("Registration failed: {}", e);
        }
        println!("Account created for {}.", registration.username);

        self.login(registration.credentials()).await
    }

    async fn login(&mut self, credentials: Credentials) -> Result<()> {
        if !credentials.is_complete() {
            bail!("Username and password required");
        }
        match self.session.login(&credentials).await {
            Ok(user) => {
                info!(username = %user.username, role = %user.role, "Login successful");
                if let Err(e) = Config::remember_username(&credentials.username) {
                    warn!(error = %e, "Failed to save last username");
                }
                self.config.last_username = Some(credentials.username);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                bail!(e.user_message())
            }
        }
    }

    pub fn logout(&self) {
        let was_signed_in = self.session.is_authenticated();
        self.session.logout();
        if was_signed_in {
            println!("Signed out.");
        } else {
            println!("Not signed in.");
        }
    }

    pub fn print_status(&self) {
        self.session.check_expiry();
        println!("Backend: {}", self.api.base_url());
        print!("{}", views::render_status(&self.session.snapshot(), Utc::now()));
    }
}

/// Fetch the results of each past analysis, a few at a time.
async fn fetch_history_details(
    api: &ApiClient,
    history: Vec<JobHistory>,
) -> Vec<(JobHistory, Result<RecommendationResponse, ApiError>)> {
    debug!(
        "Fetching {} history details with max {} concurrent requests...",
        history.len(),
        MAX_CONCURRENT_REQUESTS
    );

    let mut results: Vec<_> = stream::iter(history.into_iter().enumerate())
        .map(|(index, job)| {
            let api = api.clone();
            async move {
                let result = api.fetch_history_detail(&job.id).await;
                (index, job, result)
            }
        })
        .buffer_unordered(MAX_CONCURRENT_REQUESTS)
        .collect()
        .await;

    // Completion order is arbitrary; show newest first as listed.
    results.sort_by_key(|(index, _, _)| *index);
    results
        .into_iter()
        .map(|(_, job, result)| (job, result))
        .collect()
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn prompt_username(last_user: Option<&str>) -> Result<String> {
    match last_user {
        Some(last) => print!("Username [{}]: ", last),
        None => print!("Username: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    Ok(match (input.is_empty(), last_user) {
        (true, Some(last)) => last.to_string(),
        _ => input.to_string(),
    })
}

fn prompt_password() -> Result<String> {
    Ok(rpassword::prompt_password("Password: ")?)
}

fn prompt_new_password() -> Result<String> {
    let password = rpassword::prompt_password("Choose a password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    Ok(password)
}

// ============================================================================
// Input validation helpers
// ============================================================================

/// Check if a character is valid for input (no control characters)
fn is_valid_input_char(c: char) -> bool {
    !c.is_control()
}

fn validate_field(field: &str, value: &str, max_len: usize) -> Result<()> {
    if value.is_empty() {
        bail!("{} is required", field);
    }
    if value.chars().count() > max_len {
        bail!("{} must be at most {} characters", field, max_len);
    }
    if !value.chars().all(is_valid_input_char) {
        bail!("{} contains invalid characters", field);
    }
    Ok(())
}

/// Reject credentials before they reach the backend.
pub fn validate_credentials(username: &str, password: &str) -> Result<()> {
    validate_field("Username", username, MAX_USERNAME_LENGTH)?;
    validate_field("Password", password, MAX_PASSWORD_LENGTH)
}

// ============================================================================
// Tests
// ============================================================================
