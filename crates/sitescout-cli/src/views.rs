//! Plain-text rendering of each view.
//!
//! Every function returns the rendered text so the layout can be tested
//! without a terminal.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use sitescout_core::models::{JobHistory, Profile, RecommendationResponse, UserIdentity};
use sitescout_core::utils::{format_date, format_optional, format_score, truncate_string};
use sitescout_core::SessionState;

// ============================================================================
// Constants
// ============================================================================

/// Column width for project titles in the history table
const TITLE_WIDTH: usize = 32;

/// Column width for land use in the results table
const LAND_USE_WIDTH: usize = 14;

/// Rows shown in the results table
const MAX_RESULT_ROWS: usize = 20;

const LAND_VALUE_COLUMN: &str = "Land_Value_USD_sqm";
const ROAD_DISTANCE_COLUMN: &str = "Dist_to_Road_km";

pub fn render_status(state: &SessionState, now: DateTime<Utc>) -> String {
    if state.is_loading {
        return "Loading...".to_string();
    }
    match state.user {
        Some(ref user) => {
            let mut out = String::new();
            let _ = writeln!(out, "Signed in as {} ({})", user.username, user.role);
            if let Some(ref email) = user.email {
                let _ = writeln!(out, "Email:   {}", email);
            }
            if let Some(exp) = state.expires_at {
                let _ = writeln!(
                    out,
                    "Expires: {} ({}m remaining)",
                    exp.format("%Y-%m-%d %H:%M UTC"),
                    state.minutes_until_expiry(now)
                );
            }
            out
        }
        None => "Not signed in.\n".to_string(),
    }
}

/// Server profile when available, otherwise the identity from the token.
pub fn render_profile(profile: Option<&Profile>, fallback: Option<&UserIdentity>) -> String {
    let (username, email, role, created_at) = match (profile, fallback) {
        (Some(p), _) => (
            p.username.clone(),
            p.email.clone(),
            p.role.clone(),
            p.created_at,
        ),
        (None, Some(u)) => (
            u.username.clone(),
            u.email.clone(),
            Some(u.role.clone()),
            None,
        ),
        (None, None) => return "Loading...\n".to_string(),
    };

    let mut out = String::new();
    let _ = writeln!(out, "User Profile");
    let _ = writeln!(out, "  Username: {}", username);
    let _ = writeln!(out, "  Email:    {}", format_optional(&email, "Not provided"));
    let _ = writeln!(out, "  Role:     {}", format_optional(&role, "-"));
    if let Some(ts) = created_at {
        let _ = writeln!(out, "  Member since {}", format_date(&ts));
    }
    out
}

pub fn render_history(history: &[JobHistory]) -> String {
    if history.is_empty() {
        return "No history found. Start a new analysis!\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<24}  {:<width$}  {:<12}  {:<14}  {}",
        "ID",
        "Project Title",
        "Date",
        "Results",
        "Land Use",
        width = TITLE_WIDTH
    );
    for job in history {
        let land_use = job
            .parsed_requirements()
            .map(|req| {
                req.preferred_land_use
                    .iter()
                    .map(|lu| lu.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<24}  {:<width$}  {:<12}  {:<14}  {}",
            job.id,
            truncate_string(&job.title, TITLE_WIDTH),
            format_date(&job.timestamp),
            format!("{} candidates", job.result_count),
            land_use,
            width = TITLE_WIDTH
        );
    }
    out
}

pub fn render_recommendations(results: &RecommendationResponse) -> String {
    let Some(top) = results.top() else {
        return "No valid recommendations available\n".to_string();
    };
    let ranked = results.ranked();

    let mut out = String::new();
    let _ = writeln!(out, "Top Recommendation: {}", top.site_code_display());
    let _ = writeln!(out, "Total Candidates:   {}", ranked.len());
    let _ = writeln!(out, "Analysis By:        {}", results.analyst());
    if let Some(ts) = results.timestamp {
        let _ = writeln!(out, "Analysed:           {}", ts.format("%Y-%m-%d %H:%M UTC"));
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:>4}  {:<12}  {:<width$}  {:>7}  {:>8}  {:>7}  {}",
        "#",
        "Site",
        "Land Use",
        "Score",
        "USD/sqm",
        "Road km",
        "Location",
        width = LAND_USE_WIDTH
    );
    for (i, rec) in ranked.iter().take(MAX_RESULT_ROWS).enumerate() {
        let location = match rec.coordinates() {
            Some((lat, lon)) => format!("{:.4}, {:.4}", lat, lon),
            None => "N/A".to_string(),
        };
        let _ = writeln!(
            out,
            "{:>4}  {:<12}  {:<width$}  {:>7}  {:>8}  {:>7}  {}",
            i + 1,
            truncate_string(rec.site_code_display(), 12),
            truncate_string(rec.land_use.as_deref().unwrap_or("-"), LAND_USE_WIDTH),
            format_score(rec.score(), 3),
            format_score(rec.metric(LAND_VALUE_COLUMN), 0),
            format_score(rec.metric(ROAD_DISTANCE_COLUMN), 1),
            location,
            width = LAND_USE_WIDTH
        );
    }
    out
}

pub fn render_empty_analysis() -> String {
    "No Analysis Run Yet\n\
     Run `sitescout recommend --title <TITLE>` with your project constraints\n\
     to generate site recommendations.\n"
        .to_string()
}
