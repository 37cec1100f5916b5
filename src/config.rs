use std::collections::HashSet;

use anyhow::{Context, Result};

const DEFAULT_MODEL_STACK: &[&str] = &["gemini-1.5-pro", "gemini-1.5-flash-002"];
const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Process-wide configuration, read from the environment once at startup
/// and never mutated afterwards. Handed to the handlers by reference via
/// the shared state.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub gemini_api_key: String,
    /// Private chat of the operator; receives spam reports and
    /// escalations, and doubles as the policy-tuning test surface.
    pub admin_id: i64,
    /// The comment group being moderated.
    pub group_id: i64,
    /// Sender ids exempt from classification. Always contains the admin
    /// and the group itself.
    pub whitelist: HashSet<i64>,
    /// Ordered backend candidates, primary first.
    pub model_stack: Vec<String>,
    pub health_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bot_token = required("TELEGRAM_BOT_TOKEN")?;
        let gemini_api_key = required("GEMINI_API_KEY")?;
        let admin_id = required("ADMIN_ID")?
            .trim()
            .parse::<i64>()
            .context("ADMIN_ID must be an integer chat id")?;
        let group_id = required("TARGET_GROUP_ID")?
            .trim()
            .parse::<i64>()
            .context("TARGET_GROUP_ID must be an integer chat id")?;

        let mut whitelist = parse_id_list(&std::env::var("WHITELIST_IDS").unwrap_or_default())
            .context("WHITELIST_IDS must be a comma-separated list of integer ids")?;
        whitelist.insert(admin_id);
        whitelist.insert(group_id);

        let model_stack = match std::env::var("MODEL_STACK") {
            Ok(raw) => parse_model_stack(&raw)?,
            Err(_) => DEFAULT_MODEL_STACK.iter().map(|s| s.to_string()).collect(),
        };

        let health_port = match std::env::var("HEALTH_PORT") {
            Ok(raw) => raw
                .trim()
                .parse::<u16>()
                .context("HEALTH_PORT must be a port number")?,
            Err(_) => DEFAULT_HEALTH_PORT,
        };

        Ok(Self {
            bot_token,
            gemini_api_key,
            admin_id,
            group_id,
            whitelist,
            model_stack,
            health_port,
        })
    }

    pub fn is_whitelisted(&self, id: i64) -> bool {
        self.whitelist.contains(&id)
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("Missing required environment variable {name}"))
}

fn parse_id_list(raw: &str) -> Result<HashSet<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .with_context(|| format!("Invalid id in list: {s:?}"))
        })
        .collect()
}

fn parse_model_stack(raw: &str) -> Result<Vec<String>> {
    let stack: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    anyhow::ensure!(!stack.is_empty(), "MODEL_STACK must name at least one model");
    Ok(stack)
}
