//! Anti-detection toolkit: user-agent rotation, header forging, viewport
//! randomization, automation masking, and human-like pacing.
//!
//! Forged headers stay consistent with the browser family of the chosen
//! user-agent — a Firefox UA with Chromium client hints is itself a
//! fingerprint.

use crate::config::Mode;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

/// Pool of current, professional user-agents across the major families.
pub const USER_AGENTS: [&str; 16] = [
    // Chrome desktop
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    // Firefox
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Safari
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    // Edge
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.2903.86",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.2903.86",
    // Mobile
    "Mozilla/5.0 (iPhone; CPU iPhone OS 18_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/131.0.6778.73 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Android 15; Mobile; rv:133.0) Gecko/133.0 Firefox/133.0",
    "Mozilla/5.0 (Linux; Android 15; SM-S928B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (iPad; CPU OS 18_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Mobile/15E148 Safari/604.1",
];

/// Plausible desktop viewport sizes.
pub const VIEWPORTS: [(u32, u32); 6] = [
    (1366, 768),
    (1920, 1080),
    (1440, 900),
    (1536, 864),
    (1680, 1050),
    (1280, 800),
];

const ACCEPT_LANGUAGES: [&str; 3] = [
    "en-US,en;q=0.9",
    "en-US,en;q=0.8,de;q=0.5",
    "en-GB,en;q=0.9,en-US;q=0.8",
];

/// One randomized browser identity, sampled per pooled instance or per
/// advanced-strategy call.
#[derive(Debug, Clone)]
pub struct StealthProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub accept_language: String,
    /// Family-consistent request headers, including the user-agent.
    pub headers: Vec<(String, String)>,
    /// Pre-navigation pause to blunt behavioral fingerprinting.
    pub human_delay: Duration,
}

impl StealthProfile {
    pub fn random(mode: Mode) -> Self {
        let mut rng = rand::thread_rng();
        let user_agent = (*USER_AGENTS.choose(&mut rng).unwrap_or(&USER_AGENTS[0])).to_string();
        let viewport = *VIEWPORTS.choose(&mut rng).unwrap_or(&VIEWPORTS[0]);
        let accept_language =
            (*ACCEPT_LANGUAGES.choose(&mut rng).unwrap_or(&ACCEPT_LANGUAGES[0])).to_string();
        let headers = forge_headers(&user_agent, &accept_language);
        Self {
            user_agent,
            viewport,
            accept_language,
            headers,
            human_delay: human_delay(mode),
        }
    }
}

/// Sample the human-like delay for the given mode.
///
/// The delay counts against the layer timeout and the global deadline, so
/// production values (3–7 s) assume layer budgets of 15 s and up.
pub fn human_delay(mode: Mode) -> Duration {
    let mut rng = rand::thread_rng();
    let ms = match mode {
        Mode::Production => rng.gen_range(3_000..=7_000),
        Mode::Development => rng.gen_range(300..=800),
        Mode::Testing => rng.gen_range(10..=50),
    };
    Duration::from_millis(ms)
}

/// Build a header set consistent with the user-agent's browser family.
pub fn forge_headers(user_agent: &str, accept_language: &str) -> Vec<(String, String)> {
    let is_chromium = user_agent.contains("Chrome") || user_agent.contains("CriOS");
    let is_firefox = user_agent.contains("Firefox");
    let is_mobile = user_agent.contains("Mobile")
        || user_agent.contains("iPhone")
        || user_agent.contains("Android");

    let mut headers: Vec<(String, String)> = vec![
        ("user-agent".into(), user_agent.to_string()),
        ("accept-language".into(), accept_language.to_string()),
        ("accept-encoding".into(), "gzip, deflate, br".into()),
        ("dnt".into(), "1".into()),
        ("upgrade-insecure-requests".into(), "1".into()),
    ];

    if is_chromium {
        headers.push((
            "accept".into(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8".into(),
        ));
        headers.push(("sec-fetch-dest".into(), "document".into()));
        headers.push(("sec-fetch-mode".into(), "navigate".into()));
        headers.push(("sec-fetch-site".into(), "none".into()));
        headers.push(("sec-fetch-user".into(), "?1".into()));
        headers.push((
            "sec-ch-ua".into(),
            "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"131\", \"Google Chrome\";v=\"131\"".into(),
        ));
        headers.push((
            "sec-ch-ua-mobile".into(),
            if is_mobile { "?1" } else { "?0" }.into(),
        ));
        let platform = if user_agent.contains("Android") {
            "\"Android\""
        } else if user_agent.contains("Mac") {
            "\"macOS\""
        } else if user_agent.contains("Linux") {
            "\"Linux\""
        } else {
            "\"Windows\""
        };
        headers.push(("sec-ch-ua-platform".into(), platform.into()));
    } else if is_firefox {
        headers.push((
            "accept".into(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8".into(),
        ));
        headers.push(("sec-fetch-dest".into(), "document".into()));
        headers.push(("sec-fetch-mode".into(), "navigate".into()));
        headers.push(("sec-fetch-site".into(), "none".into()));
    } else {
        // Safari keeps a lean header set
        headers.push((
            "accept".into(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".into(),
        ));
    }

    headers
}

/// Chromium launch flags suppressing automation fingerprints.
///
/// `advanced` adds the heavier set the private-browser strategy uses to
/// negotiate JavaScript challenges.
pub fn launch_args(advanced: bool) -> Vec<String> {
    let mut args: Vec<String> = [
        "--headless=new",
        "--disable-gpu",
        "--no-sandbox",
        "--disable-setuid-sandbox",
        "--disable-dev-shm-usage",
        "--disable-blink-features=AutomationControlled",
        "--disable-infobars",
        "--disable-extensions",
        "--disable-background-networking",
        "--disable-background-timer-throttling",
        "--disable-backgrounding-occluded-windows",
        "--disable-renderer-backgrounding",
        "--no-first-run",
        "--no-default-browser-check",
        "--mute-audio",
        "--hide-scrollbars",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if advanced {
        args.extend(
            [
                "--disable-features=VizDisplayCompositor",
                "--disable-field-trial-config",
                "--disable-back-forward-cache",
                "--disable-hang-monitor",
                "--disable-prompt-on-repost",
                "--disable-sync",
                "--force-color-profile=srgb",
                "--metrics-recording-only",
                "--no-crash-upload",
                "--no-pings",
                "--password-store=basic",
                "--use-mock-keychain",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
    }

    args
}

/// Injected before any page script runs; patches the signals headless
/// detection checks first.
pub const MASK_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined, configurable: true });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
if (!window.chrome) { window.chrome = { runtime: {} }; }
"#;

/// Gradual scroll to ~60% of page height, mimicking a reading user and
/// triggering lazy-loaded content.
pub const SCROLL_SCRIPT: &str = r#"
() => new Promise((resolve) => {
    let total = 0;
    const step = 100;
    const timer = setInterval(() => {
        window.scrollBy(0, step);
        total += step;
        if (total >= document.body.scrollHeight * 0.6) {
            clearInterval(timer);
            resolve();
        }
    }, 100);
})
"#;
