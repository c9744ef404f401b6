//! HTTP implementation of the page fetcher.
//!
//! Listing pages are fetched with one shared `reqwest::Client` and parsed
//! with CSS selectors. Which selectors to use is configuration
//! ([`ListingSelectors`]), so pointing the crawler at a different listing
//! layout needs a YAML file, not code.
//!
//! ```yaml
//! url_template: "https://jobs.example.com/list?page={page}"
//! max_retries: 2
//! selectors:
//!   item: "li.job"
//!   title: ".title"
//!   link: "a.title"
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{FetchError, SessionError};

use super::config::ConfigError;
use super::fetcher::{FetchSession, SessionFactory};
use super::record::{PageNumber, RawJobRecord};

/// Placeholder replaced by the page number in `url_template`.
pub const PAGE_PLACEHOLDER: &str = "{page}";

const DEFAULT_URL_TEMPLATE: &str =
    "https://www.saramin.co.kr/zf_user/jobs/public/list?type=all&page={page}";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// CSS selectors locating job fields inside one listing page.
///
/// Every field selector is evaluated relative to an `item` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    pub item: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub career: String,
    pub education: String,
    pub salary: String,
    /// Matches every sector tag of an item.
    pub sector: String,
    /// Element whose `href` is the posting link.
    pub link: String,
    pub position: Option<String>,
    /// Matches every tech-stack tag of an item.
    pub tech_stack: Option<String>,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            item: ".list_item".to_string(),
            title: ".notification_info .job_tit .str_tit span".to_string(),
            company: ".company_nm .str_tit".to_string(),
            location: ".recruit_info .work_place".to_string(),
            career: ".recruit_info .career".to_string(),
            education: ".recruit_info .education".to_string(),
            salary: ".recruit_info .salary".to_string(),
            sector: ".job_sector span".to_string(),
            link: ".notification_info .job_tit .str_tit".to_string(),
            position: None,
            tech_stack: None,
        }
    }
}

/// Configuration for the HTTP listing fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// Listing URL with a `{page}` placeholder.
    pub url_template: String,
    pub user_agent: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Retries after a transient failure (transport error, 5xx, 429).
    pub max_retries: u32,
    /// Base delay between retries; multiplied by the attempt number.
    pub retry_delay_ms: u64,
    pub selectors: ListingSelectors,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 30,
            max_retries: 2,
            retry_delay_ms: 500,
            selectors: ListingSelectors::default(),
        }
    }
}

impl ListingConfig {
    /// Loads a listing configuration from a YAML file. Missing keys keep
    /// their default values.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = template.into();
        self
    }

    /// Validates the URL template and every selector.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.url_template.contains(PAGE_PLACEHOLDER) {
            return Err(ConfigError::ValidationFailed(format!(
                "url_template must contain {}",
                PAGE_PLACEHOLDER
            )));
        }

        Url::parse(&self.page_url(1)).map_err(|e| {
            ConfigError::ValidationFailed(format!("url_template is not a valid URL: {}", e))
        })?;

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        CompiledSelectors::compile(&self.selectors).map_err(ConfigError::ValidationFailed)?;
        Ok(())
    }

    /// Returns the URL of a listing page.
    pub fn page_url(&self, page: PageNumber) -> String {
        self.url_template
            .replace(PAGE_PLACEHOLDER, &page.to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Parsed form of [`ListingSelectors`].
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    item: Selector,
    title: Selector,
    company: Selector,
    location: Selector,
    career: Selector,
    education: Selector,
    salary: Selector,
    sector: Selector,
    link: Selector,
    position: Option<Selector>,
    tech_stack: Option<Selector>,
}

impl CompiledSelectors {
    /// Parses every selector, naming the first invalid one on failure.
    pub fn compile(selectors: &ListingSelectors) -> Result<Self, String> {
        fn parse(name: &str, css: &str) -> Result<Selector, String> {
            Selector::parse(css).map_err(|e| format!("invalid {} selector '{}': {}", name, css, e))
        }

        Ok(Self {
            item: parse("item", &selectors.item)?,
            title: parse("title", &selectors.title)?,
            company: parse("company", &selectors.company)?,
            location: parse("location", &selectors.location)?,
            career: parse("career", &selectors.career)?,
            education: parse("education", &selectors.education)?,
            salary: parse("salary", &selectors.salary)?,
            sector: parse("sector", &selectors.sector)?,
            link: parse("link", &selectors.link)?,
            position: selectors
                .position
                .as_deref()
                .map(|css| parse("position", css))
                .transpose()?,
            tech_stack: selectors
                .tech_stack
                .as_deref()
                .map(|css| parse("tech_stack", css))
                .transpose()?,
        })
    }
}

/// Extracts raw job records from one listing page.
///
/// Field text is trimmed with inner whitespace collapsed. Links are resolved
/// against `page_url`. A missing field becomes an empty string and is left
/// for the validator to reject.
///
/// # Errors
///
/// Returns `FetchError::NoListings` when the page has no item element at
/// all, which usually means the page did not render the listing.
pub fn parse_listing(
    html: &str,
    selectors: &CompiledSelectors,
    page_url: &Url,
    page: PageNumber,
) -> Result<Vec<RawJobRecord>, FetchError> {
    let document = Html::parse_document(html);

    let items: Vec<ElementRef<'_>> = document.select(&selectors.item).collect();
    if items.is_empty() {
        return Err(FetchError::NoListings { page });
    }

    let records = items
        .into_iter()
        .map(|item| RawJobRecord {
            title: first_text(item, &selectors.title),
            company: first_text(item, &selectors.company),
            location: first_text(item, &selectors.location),
            career: first_text(item, &selectors.career),
            education: first_text(item, &selectors.education),
            salary: first_text(item, &selectors.salary),
            sectors: all_text(item, &selectors.sector),
            link: first_link(item, &selectors.link, page_url),
            position: selectors
                .position
                .as_ref()
                .map(|sel| first_text(item, sel))
                .filter(|p| !p.is_empty()),
            tech_stack: selectors
                .tech_stack
                .as_ref()
                .map(|sel| all_text(item, sel))
                .unwrap_or_default(),
        })
        .collect();

    Ok(records)
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(item: ElementRef<'_>, selector: &Selector) -> String {
    item.select(selector)
        .next()
        .map(element_text)
        .unwrap_or_default()
}

fn all_text(item: ElementRef<'_>, selector: &Selector) -> Vec<String> {
    item.select(selector)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect()
}

fn first_link(item: ElementRef<'_>, selector: &Selector, page_url: &Url) -> String {
    item.select(selector)
        .find_map(|el| el.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .map(String::from)
        .unwrap_or_default()
}

/// Opens [`HttpSession`]s.
#[derive(Debug, Clone, Default)]
pub struct HttpSessionFactory {
    config: ListingConfig,
}

impl HttpSessionFactory {
    pub fn new(config: ListingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open(&self) -> Result<Arc<dyn FetchSession>, SessionError> {
        self.config
            .validate()
            .map_err(|e| SessionError::Open(e.to_string()))?;

        let selectors =
            CompiledSelectors::compile(&self.config.selectors).map_err(SessionError::Open)?;

        let client = Client::builder()
            .user_agent(self.config.user_agent.clone())
            .timeout(self.config.request_timeout())
            .build()
            .map_err(|e| SessionError::Open(e.to_string()))?;

        debug!(url_template = %self.config.url_template, "HTTP fetch session opened");

        Ok(Arc::new(HttpSession {
            client,
            config: self.config.clone(),
            selectors,
        }))
    }
}

/// Fetch session backed by one `reqwest::Client`.
pub struct HttpSession {
    client: Client,
    config: ListingConfig,
    selectors: CompiledSelectors,
}

impl HttpSession {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                code: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| self.map_request_error(e))
    }

    fn map_request_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.config.request_timeout())
        } else {
            FetchError::Request(e.to_string())
        }
    }
}

#[async_trait]
impl FetchSession for HttpSession {
    async fn fetch_page(&self, page: PageNumber) -> Result<Vec<RawJobRecord>, FetchError> {
        let url = self.config.page_url(page);
        let page_url = Url::parse(&url).map_err(|e| FetchError::Parse(e.to_string()))?;

        let mut attempt = 0;
        loop {
            match self.fetch_html(&url).await {
                Ok(html) => return parse_listing(&html, &self.selectors, &page_url, page),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    debug!(page, attempt, error = %e, "Retrying listing page");
                    let delay = self.config.retry_delay_ms * u64::from(attempt);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn close(&self) -> Result<(), SessionError> {
        debug!("HTTP fetch session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::record::filter_records;
    use std::io::Write;

    const FIXTURE: &str = r#"
        <html><body>
          <div class="list_body">
            <div class="list_item">
              <div class="company_nm"><a class="str_tit">  Acme   Corp </a></div>
              <div class="notification_info">
                <div class="job_tit">
                  <a class="str_tit" href="/zf_user/jobs/view?rec_idx=101"><span>Backend
                    Engineer</span></a>
                </div>
                <div class="job_sector"><span>Backend</span> <span>Rust</span><span> </span></div>
              </div>
              <div class="recruit_info">
                <p class="work_place">Seoul</p>
                <p class="career">3+ years</p>
                <p class="education">Bachelor's</p>
                <p class="salary">Negotiable</p>
              </div>
            </div>
            <div class="list_item">
              <div class="company_nm"><a class="str_tit">Globex</a></div>
              <div class="notification_info">
                <div class="job_tit">
                  <a class="str_tit" href="https://other.example.com/job/7"><span>Data Analyst</span></a>
                </div>
              </div>
              <div class="recruit_info">
                <p class="work_place">Busan</p>
              </div>
            </div>
          </div>
        </body></html>
    "#;

    fn compiled() -> CompiledSelectors {
        CompiledSelectors::compile(&ListingSelectors::default()).expect("defaults compile")
    }

    fn page_url() -> Url {
        Url::parse("https://www.saramin.co.kr/zf_user/jobs/public/list?type=all&page=1")
            .expect("valid url")
    }

    #[test]
    fn test_parse_listing_extracts_fields() {
        let records = parse_listing(FIXTURE, &compiled(), &page_url(), 1).expect("should parse");

        assert_eq!(records.len(), 2);
        let first = &records[0];
        assert_eq!(first.title, "Backend Engineer");
        assert_eq!(first.company, "Acme Corp");
        assert_eq!(first.location, "Seoul");
        assert_eq!(first.career, "3+ years");
        assert_eq!(first.education, "Bachelor's");
        assert_eq!(first.salary, "Negotiable");
        assert_eq!(first.sectors, ["Backend", "Rust"]);
        assert_eq!(
            first.link,
            "https://www.saramin.co.kr/zf_user/jobs/view?rec_idx=101"
        );
        assert_eq!(first.position, None);
        assert!(first.tech_stack.is_empty());

        assert_eq!(records[1].link, "https://other.example.com/job/7");
        assert!(records[1].career.is_empty());
    }

    #[test]
    fn test_partial_items_are_filtered_downstream() {
        let records = parse_listing(FIXTURE, &compiled(), &page_url(), 1).expect("should parse");
        let (kept, dropped) = filter_records(records);

        assert_eq!(kept.len(), 1);
        assert_eq!(dropped, 1);
        assert_eq!(kept[0].company(), "Acme Corp");
    }

    #[test]
    fn test_parse_listing_without_items() {
        let err = parse_listing("<html><body><p>Loading…</p></body></html>", &compiled(), &page_url(), 4)
            .unwrap_err();
        assert_eq!(err, FetchError::NoListings { page: 4 });
    }

    #[test]
    fn test_optional_selectors() {
        let selectors = ListingSelectors {
            position: Some(".job_tit span".to_string()),
            tech_stack: Some(".job_sector span".to_string()),
            ..Default::default()
        };
        let compiled = CompiledSelectors::compile(&selectors).expect("should compile");

        let records = parse_listing(FIXTURE, &compiled, &page_url(), 1).expect("should parse");
        assert_eq!(records[0].position.as_deref(), Some("Backend Engineer"));
        assert_eq!(records[0].tech_stack, ["Backend", "Rust"]);
        assert!(records[1].tech_stack.is_empty());
    }

    #[test]
    fn test_invalid_selector_is_reported() {
        let selectors = ListingSelectors {
            salary: "p[[".to_string(),
            ..Default::default()
        };
        let err = CompiledSelectors::compile(&selectors).unwrap_err();
        assert!(err.contains("salary"));
    }

    #[test]
    fn test_page_url_and_validation() {
        let config = ListingConfig::default().with_url_template("https://jobs.example.com/?p={page}");
        assert_eq!(config.page_url(12), "https://jobs.example.com/?p=12");
        assert!(config.validate().is_ok());

        let config = ListingConfig::default().with_url_template("https://jobs.example.com/");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_listing_config_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "url_template: \"https://jobs.example.com/list?page={{page}}\"\nmax_retries: 0\nselectors:\n  item: \"li.job\"\n  title: \".title\""
        )
        .expect("write yaml");

        let config = ListingConfig::from_yaml_file(file.path()).expect("should load");

        assert_eq!(config.url_template, "https://jobs.example.com/list?page={page}");
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.selectors.item, "li.job");
        assert_eq!(config.selectors.title, ".title");
        assert_eq!(config.selectors.salary, ListingSelectors::default().salary);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_factory_rejects_invalid_config() {
        let factory =
            HttpSessionFactory::new(ListingConfig::default().with_url_template("not a url {page}"));
        let err = factory.open().await.err().expect("open should fail");
        assert!(matches!(err, SessionError::Open(_)));
    }
}
