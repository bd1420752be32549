//! User-agent sniffing.
//!
//! Reduces a raw `User-Agent` header to a short descriptor for reports. This
//! is heuristic substring matching, not a full UA grammar:
//!
//! | agent (abridged)                                              | descriptor            |
//! |---------------------------------------------------------------|-----------------------|
//! | `Mozilla/5.0 (Windows NT 5.1; ...) (via ggpht.com GoogleImageProxy)` | `Gmail image proxy` |
//! | `Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 ...) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148` | `Apple Mail on iOS` |
//! | `... Chrome/120.0 Safari/537.36 Edg/120.0`                   | `Edge on Windows`     |
//! | `curl/8.4.0`                                                  | `Automated (curl)`    |
//! | ``                                                            | `Unknown client`      |

/// Descriptor used when the agent string is empty.
pub const UNKNOWN_CLIENT: &str = "Unknown client";

/// Client family recognised from a user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Client {
    GmailProxy,
    YahooProxy,
    Outlook,
    Thunderbird,
    AppleMail,
    Edge,
    Chrome,
    Firefox,
    Safari,
    Automated(&'static str),
    Other,
}

impl Client {
    const fn label(self) -> &'static str {
        match self {
            Self::GmailProxy => "Gmail image proxy",
            Self::YahooProxy => "Yahoo Mail proxy",
            Self::Outlook => "Outlook",
            Self::Thunderbird => "Thunderbird",
            Self::AppleMail => "Apple Mail",
            Self::Edge => "Edge",
            Self::Chrome => "Chrome",
            Self::Firefox => "Firefox",
            Self::Safari => "Safari",
            Self::Automated(_) => "Automated",
            Self::Other => "Browser",
        }
    }

    /// Image proxies fetch on behalf of the recipient; their origin is the
    /// proxy, not the reader.
    #[must_use]
    pub const fn is_proxy(self) -> bool {
        matches!(self, Self::GmailProxy | Self::YahooProxy)
    }
}

/// Operating system recognised from a user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Ios,
    Android,
    Linux,
}

impl Platform {
    const fn label(self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::MacOs => "macOS",
            Self::Ios => "iOS",
            Self::Android => "Android",
            Self::Linux => "Linux",
        }
    }
}

const AUTOMATED_MARKERS: &[(&str, &str)] = &[
    ("curl/", "curl"),
    ("wget/", "wget"),
    ("python-requests", "python-requests"),
    ("go-http-client", "go-http-client"),
    ("headlesschrome", "headless chrome"),
    ("bot", "bot"),
    ("spider", "spider"),
    ("crawler", "crawler"),
];

/// Classify the client family.
#[must_use]
pub fn client(agent: &str) -> Client {
    let lower = agent.to_ascii_lowercase();

    if lower.contains("googleimageproxy") {
        return Client::GmailProxy;
    }
    if lower.contains("yahoomailproxy") {
        return Client::YahooProxy;
    }
    if let Some((_, name)) = AUTOMATED_MARKERS
        .iter()
        .find(|(marker, _)| lower.contains(marker))
    {
        return Client::Automated(name);
    }
    if lower.contains("microsoft outlook")
        || lower.contains("ms-office")
        || lower.contains("outlook-")
    {
        return Client::Outlook;
    }
    if lower.contains("thunderbird/") {
        return Client::Thunderbird;
    }
    if lower.contains("edg/") {
        return Client::Edge;
    }
    if lower.contains("firefox/") {
        return Client::Firefox;
    }
    if lower.contains("chrome/") || lower.contains("crios/") {
        return Client::Chrome;
    }
    if lower.contains("safari/") {
        return Client::Safari;
    }
    // WebKit without a Safari token is the embedded view Apple Mail uses.
    let apple_device =
        lower.contains("macintosh") || lower.contains("iphone") || lower.contains("ipad");
    if lower.contains("applewebkit/") && apple_device {
        return Client::AppleMail;
    }
    Client::Other
}

/// Classify the operating system, if one is named.
#[must_use]
pub fn platform(agent: &str) -> Option<Platform> {
    let lower = agent.to_ascii_lowercase();
    if lower.contains("iphone") || lower.contains("ipad") {
        Some(Platform::Ios)
    } else if lower.contains("android") {
        Some(Platform::Android)
    } else if lower.contains("windows") {
        Some(Platform::Windows)
    } else if lower.contains("mac os x") || lower.contains("macintosh") {
        Some(Platform::MacOs)
    } else if lower.contains("linux") {
        Some(Platform::Linux)
    } else {
        None
    }
}

/// Short human descriptor for an agent string, e.g. `Chrome on Windows`.
#[must_use]
pub fn describe(agent: &str) -> String {
    let agent = agent.trim();
    if agent.is_empty() {
        return UNKNOWN_CLIENT.to_string();
    }

    let client = client(agent);
    match client {
        Client::Automated(name) => format!("{} ({name})", client.label()),
        // Proxy UAs carry a fake desktop platform; it says nothing about the reader.
        _ if client.is_proxy() => client.label().to_string(),
        _ => match platform(agent) {
            Some(os) => format!("{} on {}", client.label(), os.label()),
            None => client.label().to_string(),
        },
    }
}
