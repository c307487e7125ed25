//! Session module: everything a request needs to look like a shopper
//!
//! - `ProxyPool` / `BrowserIdentity`: random egress per attempt
//! - `CookieProvider`: the geotargeted cookie set for the run
//! - `CaptchaSolver`: answers a challenge page once

mod captcha;
mod cookies;
mod proxy;

pub use captcha::{CaptchaOracle, CaptchaSolver, ChallengeForm, CommandOracle, FormCaptchaSolver};
pub use cookies::{CookieProvider, CookieSet, StaticCookieProvider};
pub use proxy::{BrowserIdentity, Egress, ProxyPool, BROWSER_IDENTITIES};

/// The solver built from the `[captcha]` section
pub type ConfiguredSolver = FormCaptchaSolver<Option<CommandOracle>>;

pub fn solver_from_config(config: &crate::config::CaptchaConfig) -> ConfiguredSolver {
    let oracle = CommandOracle::from_command(&config.command);
    if oracle.is_none() {
        tracing::warn!("No CAPTCHA command configured; challenges will be retried instead");
    }
    FormCaptchaSolver::new(oracle)
}
