//! Styled text and the tag markup used in message templates.
//!
//! Templates use a small MiniMessage-style dialect:
//!
//! * colours: `<red>`, `<dark_gray>`, `<#f9e59d>`, `<color:aqua>`
//! * decorations: `<bold>`/`<b>`, `<italic>`/`<i>`/`<em>`, `<underlined>`/`<u>`,
//!   `<strikethrough>`/`<st>`, `<obfuscated>`/`<obf>`
//! * `</name>` closes the most recent matching tag (and anything opened after it)
//! * `<reset>` drops every open tag
//! * `\<` is a literal `<` and `\\` a literal backslash
//!
//! Unknown or malformed tags are kept as literal text, so stray angle brackets in
//! a template never swallow content.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedColor {
    Black,
    DarkBlue,
    DarkGreen,
    DarkAqua,
    DarkRed,
    DarkPurple,
    Gold,
    Gray,
    DarkGray,
    Blue,
    Green,
    Aqua,
    Red,
    LightPurple,
    Yellow,
    White,
}

impl NamedColor {
    pub fn from_name(name: &str) -> Option<Self> {
        let color = match name {
            "black" => NamedColor::Black,
            "dark_blue" => NamedColor::DarkBlue,
            "dark_green" => NamedColor::DarkGreen,
            "dark_aqua" => NamedColor::DarkAqua,
            "dark_red" => NamedColor::DarkRed,
            "dark_purple" => NamedColor::DarkPurple,
            "gold" => NamedColor::Gold,
            "gray" | "grey" => NamedColor::Gray,
            "dark_gray" | "dark_grey" => NamedColor::DarkGray,
            "blue" => NamedColor::Blue,
            "green" => NamedColor::Green,
            "aqua" => NamedColor::Aqua,
            "red" => NamedColor::Red,
            "light_purple" => NamedColor::LightPurple,
            "yellow" => NamedColor::Yellow,
            "white" => NamedColor::White,
            _ => return None,
        };
        Some(color)
    }

    pub fn name(&self) -> &'static str {
        match self {
            NamedColor::Black => "black",
            NamedColor::DarkBlue => "dark_blue",
            NamedColor::DarkGreen => "dark_green",
            NamedColor::DarkAqua => "dark_aqua",
            NamedColor::DarkRed => "dark_red",
            NamedColor::DarkPurple => "dark_purple",
            NamedColor::Gold => "gold",
            NamedColor::Gray => "gray",
            NamedColor::DarkGray => "dark_gray",
            NamedColor::Blue => "blue",
            NamedColor::Green => "green",
            NamedColor::Aqua => "aqua",
            NamedColor::Red => "red",
            NamedColor::LightPurple => "light_purple",
            NamedColor::Yellow => "yellow",
            NamedColor::White => "white",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextColor {
    Named(NamedColor),
    /// 0xRRGGBB
    Rgb(u32),
}

impl TextColor {
    fn parse(spec: &str) -> Option<Self> {
        if let Some(hex) = spec.strip_prefix('#') {
            if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return u32::from_str_radix(hex, 16).ok().map(TextColor::Rgb);
            }
            return None;
        }
        NamedColor::from_name(spec).map(TextColor::Named)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Style {
    pub color: Option<TextColor>,
    pub bold: bool,
    pub italic: bool,
    pub underlined: bool,
    pub strikethrough: bool,
    pub obfuscated: bool,
}

impl Style {
    pub fn colored(color: TextColor) -> Self {
        Style {
            color: Some(color),
            ..Style::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: Style,
}

/// Host-facing rich text: an ordered run of styled spans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichText {
    spans: Vec<Span>,
}

impl RichText {
    pub fn empty() -> Self {
        RichText::default()
    }

    pub fn plain(text: impl Into<String>) -> Self {
        let mut rich = RichText::default();
        rich.push(text, Style::default());
        rich
    }

    /// Append text, merging it into the previous span when the style matches.
    pub fn push(&mut self, text: impl Into<String>, style: Style) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        match self.spans.last_mut() {
            Some(last) if last.style == style => last.text.push_str(&text),
            _ => self.spans.push(Span { text, style }),
        }
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Text content with all styling stripped.
    pub fn plain_text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    /// Parse template markup into styled spans.
    pub fn parse(markup: &str) -> Self {
        MarkupParser::new(markup).run()
    }
}

impl fmt::Display for RichText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for span in &self.spans {
            f.write_str(&span.text)?;
        }
        Ok(())
    }
}

/// Escape user-supplied text so it cannot open or close tags.
pub fn escape_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\\' || c == '<' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

enum TagEffect {
    Color(TextColor),
    Bold,
    Italic,
    Underlined,
    Strikethrough,
    Obfuscated,
}

impl TagEffect {
    /// Resolve an opening tag body to its effect and canonical name.
    fn resolve(body: &str) -> Option<(Self, String)> {
        let name = body.to_ascii_lowercase();
        let decoration = match name.as_str() {
            "bold" | "b" => Some((TagEffect::Bold, "bold")),
            "italic" | "i" | "em" => Some((TagEffect::Italic, "italic")),
            "underlined" | "u" => Some((TagEffect::Underlined, "underlined")),
            "strikethrough" | "st" => Some((TagEffect::Strikethrough, "strikethrough")),
            "obfuscated" | "obf" => Some((TagEffect::Obfuscated, "obfuscated")),
            _ => None,
        };
        if let Some((effect, canonical)) = decoration {
            return Some((effect, canonical.to_string()));
        }
        let color_spec = ["color:", "colour:", "c:"]
            .iter()
            .find_map(|prefix| name.strip_prefix(prefix))
            .unwrap_or(&name);
        TextColor::parse(color_spec).map(|c| (TagEffect::Color(c), canonical_color(color_spec)))
    }

    fn apply(&self, style: &mut Style) {
        match self {
            TagEffect::Color(c) => style.color = Some(*c),
            TagEffect::Bold => style.bold = true,
            TagEffect::Italic => style.italic = true,
            TagEffect::Underlined => style.underlined = true,
            TagEffect::Strikethrough => style.strikethrough = true,
            TagEffect::Obfuscated => style.obfuscated = true,
        }
    }
}

fn canonical_color(spec: &str) -> String {
    match NamedColor::from_name(spec) {
        Some(named) => named.name().to_string(),
        None => spec.to_string(),
    }
}

/// Canonical name a closing tag refers to; `None` for a generic colour close.
fn canonical_close(body: &str) -> Option<String> {
    let name = body.to_ascii_lowercase();
    match name.as_str() {
        "color" | "colour" | "c" => None,
        _ => Some(match TagEffect::resolve(&name) {
            Some((_, canonical)) => canonical,
            None => name,
        }),
    }
}

struct OpenTag {
    name: String,
    is_color: bool,
    style: Style,
}

struct MarkupParser<'a> {
    input: &'a str,
    stack: Vec<OpenTag>,
    out: RichText,
    buffer: String,
}

impl<'a> MarkupParser<'a> {
    fn new(input: &'a str) -> Self {
        MarkupParser {
            input,
            stack: Vec::new(),
            out: RichText::empty(),
            buffer: String::new(),
        }
    }

    fn style(&self) -> Style {
        self.stack.last().map(|t| t.style).unwrap_or_default()
    }

    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            let text = std::mem::take(&mut self.buffer);
            let style = self.style();
            self.out.push(text, style);
        }
    }

    fn run(mut self) -> RichText {
        let input = self.input;
        let mut rest = input;
        while let Some(c) = rest.chars().next() {
            match c {
                '\\' => {
                    let mut chars = rest.chars();
                    chars.next();
                    match chars.next() {
                        Some(next @ ('<' | '\\')) => {
                            self.buffer.push(next);
                            rest = &rest[1 + next.len_utf8()..];
                        }
                        _ => {
                            self.buffer.push('\\');
                            rest = &rest[1..];
                        }
                    }
                }
                '<' => {
                    let consumed = self.try_tag(&rest[1..]);
                    match consumed {
                        Some(len) => rest = &rest[1 + len..],
                        None => {
                            self.buffer.push('<');
                            rest = &rest[1..];
                        }
                    }
                }
                other => {
                    self.buffer.push(other);
                    rest = &rest[other.len_utf8()..];
                }
            }
        }
        self.flush();
        self.out
    }

    /// Try to interpret a tag starting just after `<`. Returns the number of bytes
    /// consumed (including the closing `>`) when the tag was recognised.
    fn try_tag(&mut self, after_open: &str) -> Option<usize> {
        let end = after_open.find(['>', '<'])?;
        if after_open.as_bytes()[end] != b'>' {
            return None;
        }
        let body = &after_open[..end];
        if body.is_empty() || body.chars().any(char::is_whitespace) {
            return None;
        }

        if let Some(close) = body.strip_prefix('/') {
            let target = canonical_close(close);
            let position = self.stack.iter().rposition(|t| match &target {
                Some(name) => &t.name == name,
                None => t.is_color,
            })?;
            self.flush();
            self.stack.truncate(position);
            return Some(end + 1);
        }

        if body.eq_ignore_ascii_case("reset") {
            self.flush();
            self.stack.clear();
            return Some(end + 1);
        }

        let (effect, name) = TagEffect::resolve(body)?;
        self.flush();
        let mut style = self.style();
        effect.apply(&mut style);
        self.stack.push(OpenTag {
            name,
            is_color: matches!(effect, TagEffect::Color(_)),
            style,
        });
        Some(end + 1)
    }
}
