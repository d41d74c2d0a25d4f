//! Report rendering.
//!
//! Rendering is a pure function of the generation time, the period and the
//! entries; it performs no I/O.

use crate::entry::DigestEntry;
use crate::schedule::ReportPeriod;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::Deserialize;

/// Output format of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Html,
    Markdown,
}

impl ReportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Html => "text/html; charset=utf-8",
            ReportFormat::Markdown => "text/markdown; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Markdown => "md",
        }
    }
}

/// A rendered report, ready to publish
#[derive(Debug, Clone)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub period: ReportPeriod,
    pub entries: Vec<DigestEntry>,
    pub format: ReportFormat,
    pub rendered_bytes: Bytes,
}

impl Report {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    pub fn untranslated_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_untranslated()).count()
    }
}

pub struct ReportRenderer {
    format: ReportFormat,
    title: String,
    language: String,
    offset: FixedOffset,
}

impl ReportRenderer {
    pub fn new(
        format: ReportFormat,
        title: impl Into<String>,
        language: impl Into<String>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            format,
            title: title.into(),
            language: language.into(),
            offset,
        }
    }

    pub fn render(
        &self,
        generated_at: DateTime<Utc>,
        period: ReportPeriod,
        entries: Vec<DigestEntry>,
    ) -> Report {
        let body = match self.format {
            ReportFormat::Html => self.render_html(generated_at, period, &entries),
            ReportFormat::Markdown => self.render_markdown(generated_at, period, &entries),
        };

        Report {
            generated_at,
            period,
            entries,
            format: self.format,
            rendered_bytes: Bytes::from(body),
        }
    }

    fn local_timestamp(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset)
            .to_rfc3339_opts(SecondsFormat::Secs, false)
    }

    fn local_day(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format("%Y-%m-%d").to_string()
    }

    fn render_html(
        &self,
        generated_at: DateTime<Utc>,
        period: ReportPeriod,
        entries: &[DigestEntry],
    ) -> String {
        let title = html_escape::encode_text(&self.title);
        let lang = html_escape::encode_double_quoted_attribute(&self.language);

        let mut lines = vec![
            "<!DOCTYPE html>".to_string(),
            format!("<html lang=\"{}\">", lang),
            "<head>".to_string(),
            "<meta charset=\"utf-8\">".to_string(),
            format!("<title>{} ({})</title>", title, period),
            "</head>".to_string(),
            "<body>".to_string(),
            format!("<h1>{}</h1>", title),
            format!("<p class=\"period\">{}</p>", period),
            format!(
                "<p class=\"generated\">Generated <time datetime=\"{0}\">{0}</time></p>",
                self.local_timestamp(generated_at)
            ),
        ];

        if entries.is_empty() {
            lines.push("<p class=\"empty\">No entries for this period.</p>".to_string());
        } else {
            lines.push("<ol class=\"entries\">".to_string());
            for entry in entries {
                self.render_html_entry(&mut lines, entry);
            }
            lines.push("</ol>".to_string());
        }

        lines.push("</body>".to_string());
        lines.push("</html>".to_string());
        join_lines(lines)
    }

    fn render_html_entry(&self, lines: &mut Vec<String>, entry: &DigestEntry) {
        let class = if entry.is_untranslated() {
            "entry untranslated"
        } else {
            "entry"
        };
        lines.push(format!("<li class=\"{}\">", class));

        let title = html_escape::encode_text(display_title(entry));
        lines.push(match entry.entry.link.as_deref().filter(|l| is_web_link(l)) {
            Some(link) => format!(
                "<h2><a href=\"{}\">{}</a></h2>",
                html_escape::encode_double_quoted_attribute(link),
                title
            ),
            None => format!("<h2>{}</h2>", title),
        });

        if let Some(published_at) = entry.entry.published_at {
            lines.push(format!(
                "<p class=\"published\"><time datetime=\"{}\">{}</time></p>",
                self.local_timestamp(published_at),
                self.local_day(published_at)
            ));
        }

        if let Some(summary) = entry.display_summary() {
            lines.push(format!(
                "<p class=\"summary\">{}</p>",
                html_escape::encode_text(summary)
            ));
        }

        if entry.is_untranslated() {
            lines.push("<p class=\"notice\">(untranslated)</p>".to_string());
        }

        lines.push("</li>".to_string());
    }

    fn render_markdown(
        &self,
        generated_at: DateTime<Utc>,
        period: ReportPeriod,
        entries: &[DigestEntry],
    ) -> String {
        let mut lines = vec![
            format!("# {} ({})", escape_markdown(&self.title), period),
            String::new(),
            format!("_Generated {}_", self.local_timestamp(generated_at)),
            String::new(),
        ];

        if entries.is_empty() {
            lines.push("No entries for this period.".to_string());
            return join_lines(lines);
        }

        for entry in entries {
            let title = escape_markdown(display_title(entry));
            let mut heading = match entry.entry.link.as_deref().filter(|l| is_web_link(l)) {
                Some(link) => format!("- [**{}**]({})", title, escape_markdown_link(link)),
                None => format!("- **{}**", title),
            };
            if let Some(published_at) = entry.entry.published_at {
                heading.push_str(&format!(" ({})", self.local_day(published_at)));
            }
            lines.push(heading);

            if let Some(summary) = entry.display_summary() {
                lines.push(format!("  {}", escape_markdown(summary)));
            }
            if entry.is_untranslated() {
                lines.push("  _(untranslated)_".to_string());
            }
        }

        join_lines(lines)
    }
}

/// Join lines with a trailing newline after the last one.
fn join_lines(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn display_title(entry: &DigestEntry) -> &str {
    let title = entry.display_title();
    if title.trim().is_empty() {
        "(untitled)"
    } else {
        title
    }
}

fn is_web_link(link: &str) -> bool {
    url::Url::parse(link)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '`' | '[' | ']' | '<' | '>' | '#') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_markdown_link(link: &str) -> String {
    link.replace(' ', "%20")
        .replace('(', "%28")
        .replace(')', "%29")
}
