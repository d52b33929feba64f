//! Turns a noisy OCR transcript of the browser chrome into a search phrase
//! and splits that phrase into subject and context.
//!
//! Both stages are ordered rule tables where the first match wins. The order
//! is the precedence policy between ambiguous phrasings (is "Roxy FNAF - Ruin"
//! split at the dash or at the franchise name?) and must not be reshuffled.

use regex::Regex;

/// Where in the transcript a candidate phrase was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    /// `q=<text>&` from the address bar.
    UrlParameter,
    /// A literal `Search: <text>` field.
    SearchField,
    /// `Google Search for "<text>"`.
    QuotedTitle,
    /// `<text> - Google Search` tab or window title.
    ResultsTitle,
    /// Heuristic pick among short lines that don't look like browser UI.
    LineScan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub text: String,
    pub source: CandidateSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    /// The cleaned search phrase.
    pub query: String,
    pub subject: String,
    pub context: Option<String>,
}

struct ExtractionRule {
    source: CandidateSource,
    pattern: Regex,
}

struct SplitRule {
    name: &'static str,
    /// Group 1 is the subject, group 2 the context.
    pattern: Regex,
}

const EXTRACTION_PATTERNS: &[(CandidateSource, &str)] = &[
    (CandidateSource::UrlParameter, r"q=(.*?)&"),
    (CandidateSource::SearchField, r"Search: (.*)"),
    (CandidateSource::QuotedTitle, r#"Google Search for "(.*)""#),
    (CandidateSource::ResultsTitle, r"(.*) - Google Search"),
];

const SPLIT_PATTERNS: &[(&str, &str)] = &[
    ("from", r"(?i)^(.*?)\s+from\s+(.*)$"),
    ("dash", r"^(.*?)\s+[-–—]\s+(.*)$"),
    ("in", r"(?i)^(.*?)\s+in\s+(.*)$"),
];

/// Browser chrome that OCR drags into candidates, optionally preceded by the
/// dash or bar that joins it to the page title.
const CHROME_PATTERN: &str = r"(?i)\s*(?:[-|–—]\s*)?\b(?:google search|google chrome|search with google|search google or type a url)\b";

/// Words that mark a transcript line as tab strip or results-page navigation.
/// Whole words only, so "Small talk" or "Allison" survive the filter.
const UI_LINE_PATTERN: &str = r"(?i)\b(?:chrome|google|all|images|maps|news)\b";

const LINE_SCAN_MIN_CHARS: usize = 4;
const LINE_SCAN_MAX_CHARS: usize = 49;

pub struct QueryParser {
    extraction: Vec<ExtractionRule>,
    splitting: Vec<SplitRule>,
    chrome: Regex,
    ui_line: Regex,
    repeated_punct: Regex,
    whitespace: Regex,
}

impl QueryParser {
    /// `context_tokens` feed the last split rule: a query like
    /// "<subject> <token> <rest>" splits before the token, which stays in the
    /// context ("Roxy FNAF Security Breach" → "Roxy" / "FNAF Security Breach").
    pub fn new<S: AsRef<str>>(context_tokens: &[S]) -> Result<Self, regex::Error> {
        let extraction = EXTRACTION_PATTERNS
            .iter()
            .map(|(source, pattern)| {
                Ok(ExtractionRule {
                    source: *source,
                    pattern: Regex::new(pattern)?,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        let mut splitting = SPLIT_PATTERNS
            .iter()
            .map(|(name, pattern)| {
                Ok(SplitRule {
                    name: *name,
                    pattern: Regex::new(pattern)?,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        let tokens: Vec<String> = context_tokens
            .iter()
            .map(|t| t.as_ref().trim())
            .filter(|t| !t.is_empty())
            .map(regex::escape)
            .collect();
        if !tokens.is_empty() {
            splitting.push(SplitRule {
                name: "context-token",
                pattern: Regex::new(&format!(
                    r"(?i)^(.*?)\s+((?:{})\b.*)$",
                    tokens.join("|")
                ))?,
            });
        }

        Ok(Self {
            extraction,
            splitting,
            chrome: Regex::new(CHROME_PATTERN)?,
            ui_line: Regex::new(UI_LINE_PATTERN)?,
            repeated_punct: Regex::new(r"([-.,:;!?|_~])[-.,:;!?|_~]+")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    /// Full pass: candidate, cleaning, split. `None` means the transcript
    /// holds no recognisable search, which is normal OCR noise.
    pub fn parse(&self, raw_text: &str) -> Option<ParsedQuery> {
        let candidate = self.extract_candidate(raw_text)?;
        let query = self.clean(&candidate);
        if query.is_empty() {
            return None;
        }

        let (subject, context) = self.split(&query)?;
        Some(ParsedQuery {
            query,
            subject,
            context,
        })
    }

    /// First pass over the raw transcript. The returned text is exactly what
    /// the winning rule captured, before any cleaning. A capture that cleans
    /// down to nothing (only browser chrome, say) defers to the next rule.
    pub fn extract_candidate(&self, raw_text: &str) -> Option<Candidate> {
        for rule in &self.extraction {
            let Some(captures) = rule.pattern.captures(raw_text) else {
                continue;
            };
            let Some(text) = captures.get(1).map(|m| m.as_str()) else {
                continue;
            };
            let candidate = Candidate {
                text: text.to_string(),
                source: rule.source,
            };
            if self.clean(&candidate).is_empty() {
                continue;
            }
            return Some(candidate);
        }

        self.scan_lines(raw_text).map(|text| Candidate {
            text,
            source: CandidateSource::LineScan,
        })
    }

    /// Last-resort guess for a results page whose title didn't survive OCR:
    /// keep short lines that don't look like browser UI and take the middle
    /// one. The middle pick is empirical; the search box tends to sit between
    /// the tab strip above and result snippets below.
    fn scan_lines(&self, raw_text: &str) -> Option<String> {
        if !raw_text.to_lowercase().contains("google") {
            return None;
        }

        let lines: Vec<&str> = raw_text
            .lines()
            .map(str::trim)
            .filter(|line| {
                let len = line.chars().count();
                (LINE_SCAN_MIN_CHARS..=LINE_SCAN_MAX_CHARS).contains(&len)
                    && !line.starts_with("http")
                    && !self.ui_line.is_match(line)
            })
            .collect();

        lines.get(lines.len() / 2).map(|line| line.to_string())
    }

    /// Strips browser chrome and OCR debris from a candidate and collapses
    /// whitespace and repeated punctuation.
    pub fn clean(&self, candidate: &Candidate) -> String {
        let decoded = match candidate.source {
            CandidateSource::UrlParameter => form_decode(&candidate.text),
            _ => candidate.text.clone(),
        };

        let without_chrome = self.chrome.replace_all(&decoded, " ");
        let collapsed_punct = self.repeated_punct.replace_all(&without_chrome, "$1");
        let collapsed = self.whitespace.replace_all(&collapsed_punct, " ");

        collapsed
            .trim_matches(|c: char| {
                c.is_whitespace()
                    || matches!(
                        c,
                        '"' | '\'' | '`' | '|' | ':' | ';' | ',' | '.' | '-' | '–' | '—' | '«' | '»'
                    )
            })
            .to_string()
    }

    /// Second pass: subject and optional context from a cleaned phrase. A
    /// phrase no rule splits is all subject.
    pub fn split(&self, query: &str) -> Option<(String, Option<String>)> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        for rule in &self.splitting {
            let Some(captures) = rule.pattern.captures(query) else {
                continue;
            };
            let subject = captures.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            if subject.is_empty() {
                continue;
            }
            let context = captures
                .get(2)
                .map(|m| m.as_str().trim())
                .filter(|c| !c.is_empty())
                .map(String::from);
            log::trace!("split '{query}' with rule '{}'", rule.name);
            return Some((subject.to_string(), context));
        }

        Some((query.to_string(), None))
    }
}

fn form_decode(text: &str) -> String {
    url::form_urlencoded::parse(format!("q={text}").as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| text.to_string())
}
