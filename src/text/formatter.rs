//! Template formatting for titles and messages.
//!
//! A template is markup (see [`crate::text::rich`]) with a few extras:
//!
//! * `%warp%` and `%warp_display%` expand to the warp label, escaped so a label
//!   can never inject tags
//! * `%seconds%` expands to the seconds remaining, only when that value is known
//! * `<smallcaps>…</smallcaps>` and `<sc>…</sc>` convert their plain text to
//!   small caps, leaving nested tags intact

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::host::{Subject, Title, TitleTimes};
use crate::text::rich::{escape_tags, RichText};
use crate::text::small_caps::to_small_caps;

static SMALL_CAPS_REGION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<smallcaps>(.*?)</smallcaps>|<sc>(.*?)</sc>")
        .expect("small caps pattern is valid")
});

/// Label used when a warp has no usable name.
pub const UNKNOWN_WARP: &str = "Unknown";

/// Expand placeholders and small-caps regions, then parse the result.
///
/// `seconds_left` below zero leaves `%seconds%` untouched.
pub fn format(template: &str, warp_label: Option<&str>, seconds_left: i32) -> RichText {
    if template.is_empty() {
        return RichText::empty();
    }
    RichText::parse(&expand(template, warp_label, seconds_left))
}

/// Placeholder and small-caps expansion without the final markup parse.
pub fn expand(template: &str, warp_label: Option<&str>, seconds_left: i32) -> String {
    let label = escape_tags(warp_label.unwrap_or(UNKNOWN_WARP));
    let mut processed = template
        .replace("%warp%", &label)
        .replace("%warp_display%", &label);
    if seconds_left >= 0 {
        processed = processed.replace("%seconds%", &seconds_left.to_string());
    }
    apply_small_caps(&processed)
}

fn apply_small_caps(text: &str) -> String {
    SMALL_CAPS_REGION
        .replace_all(text, |caps: &Captures| {
            let inner = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            convert_preserving_tags(inner)
        })
        .into_owned()
}

/// Small-caps every character outside `<...>` tags. Escaped characters count as text.
fn convert_preserving_tags(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut text = String::new();
    let mut in_tag = false;
    let mut chars = content.chars();

    while let Some(c) = chars.next() {
        if in_tag {
            out.push(c);
            if c == '>' {
                in_tag = false;
            }
            continue;
        }
        match c {
            '\\' => {
                text.push(c);
                if let Some(next) = chars.next() {
                    text.push(next);
                }
            }
            '<' => {
                out.push_str(&to_small_caps(&text));
                text.clear();
                out.push(c);
                in_tag = true;
            }
            _ => text.push(c),
        }
    }
    out.push_str(&to_small_caps(&text));
    out
}

/// Show a formatted title and subtitle. Timings are ticks of 50 ms.
#[allow(clippy::too_many_arguments)]
pub fn send_timed_text(
    subject: &dyn Subject,
    title: &str,
    subtitle: &str,
    fade_in: u32,
    stay: u32,
    fade_out: u32,
    warp_label: Option<&str>,
    seconds_left: i32,
) {
    subject.show_title(Title {
        title: format(title, warp_label, seconds_left),
        subtitle: format(subtitle, warp_label, seconds_left),
        times: TitleTimes::from_ticks(fade_in, stay, fade_out),
    });
}
