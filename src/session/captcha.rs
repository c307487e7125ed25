//! CAPTCHA challenge solving
//!
//! The challenge page is a small form: an image, two hidden inputs and a text
//! box. [`FormCaptchaSolver`] reads the form, asks a [`CaptchaOracle`] what the
//! image says, and submits the answer to `/errors/validateCaptcha` with the
//! same client, returning whatever page comes back.

use crate::url::origin;
use crate::{HarvestError, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::runtime::Handle;

static IMAGE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form img").unwrap());
static AMZN: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[name="amzn"]"#).unwrap());
static AMZN_R: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[name="amzn-r"]"#).unwrap());

/// Turns a challenge page into the page served after answering it
pub trait CaptchaSolver: Send + Sync {
    /// `page_url` is the URL that produced `body`
    fn solve(
        &self,
        client: &Client,
        page_url: &str,
        body: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Reads the text out of a CAPTCHA image
pub trait CaptchaOracle: Send + Sync {
    fn read(&self, image_url: &str) -> impl Future<Output = Result<String>> + Send;
}

/// No oracle configured: every read fails
impl<O: CaptchaOracle> CaptchaOracle for Option<O> {
    async fn read(&self, image_url: &str) -> Result<String> {
        match self {
            Some(oracle) => oracle.read(image_url).await,
            None => Err(HarvestError::Captcha(format!(
                "no oracle configured for {}",
                image_url
            ))),
        }
    }
}

/// Runs an external program with the image URL as its last argument and
/// takes the first line of stdout as the answer
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandOracle {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(30),
        }
    }

    /// `None` when the command line is empty
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

impl CaptchaOracle for CommandOracle {
    async fn read(&self, image_url: &str) -> Result<String> {
        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.program)
                .args(&self.args)
                .arg(image_url)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| HarvestError::Captcha(format!("{} timed out", self.program)))??;

        if !output.status.success() {
            return Err(HarvestError::Captcha(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        let answer = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .to_string();
        if answer.is_empty() {
            return Err(HarvestError::Captcha(format!(
                "{} produced no answer",
                self.program
            )));
        }
        Ok(answer)
    }
}

/// The fields of a challenge form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeForm {
    pub image_url: String,
    pub amzn: String,
    pub amzn_r: String,
}

impl ChallengeForm {
    /// Extracts the form; `None` if any field is missing
    pub fn parse(body: &str) -> Option<Self> {
        let document = Html::parse_document(body);
        let image_url = document
            .select(&IMAGE)
            .next()?
            .value()
            .attr("src")?
            .to_string();
        let amzn = document.select(&AMZN).next()?.value().attr("value")?.to_string();
        let amzn_r = document
            .select(&AMZN_R)
            .next()?
            .value()
            .attr("value")?
            .to_string();
        Some(Self {
            image_url,
            amzn,
            amzn_r,
        })
    }
}

/// Solves the standard validateCaptcha form through an oracle
#[derive(Debug, Clone)]
pub struct FormCaptchaSolver<O> {
    oracle: O,
}

impl<O: CaptchaOracle> FormCaptchaSolver<O> {
    pub fn new(oracle: O) -> Self {
        Self { oracle }
    }

    /// Reads the form and asks the oracle; returns the validate URL and query
    async fn answer(&self, page_url: &str, body: &str) -> Result<(String, Vec<(&'static str, String)>)> {
        let form = ChallengeForm::parse(body)
            .ok_or_else(|| HarvestError::Captcha(format!("no challenge form at {}", page_url)))?;

        let answer = self.oracle.read(&form.image_url).await?;
        tracing::debug!("CAPTCHA at {} read as '{}'", page_url, answer);

        let validate_url = format!("{}/errors/validateCaptcha", origin(page_url)?);
        let query = vec![
            ("amzn", form.amzn),
            ("amzn-r", form.amzn_r),
            ("field-keywords", answer.to_lowercase()),
        ];
        Ok((validate_url, query))
    }

    /// Solves through a blocking session client
    ///
    /// The oracle runs on `runtime`, so this must be called from a thread
    /// outside any async context, such as a worker-pool thread.
    pub fn solve_blocking(
        &self,
        runtime: &Handle,
        client: &reqwest::blocking::Client,
        page_url: &str,
        body: &str,
    ) -> Result<String> {
        let (validate_url, query) = runtime.block_on(self.answer(page_url, body))?;
        let response = client
            .get(&validate_url)
            .query(&query)
            .send()
            .map_err(|e| HarvestError::request(&validate_url, &e))?;
        response
            .text()
            .map_err(|e| HarvestError::body(&validate_url, &e))
    }
}

impl<O: CaptchaOracle> CaptchaSolver for FormCaptchaSolver<O> {
    async fn solve(&self, client: &Client, page_url: &str, body: &str) -> Result<String> {
        let (validate_url, query) = self.answer(page_url, body).await?;
        let response = client
            .get(&validate_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| HarvestError::request(&validate_url, &e))?;

        response
            .text()
            .await
            .map_err(|e| HarvestError::body(&validate_url, &e))
    }
}
