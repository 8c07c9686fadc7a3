//! Text handling: small caps, rich text markup and template formatting.

pub mod formatter;
pub mod rich;
pub mod small_caps;

pub use formatter::{format, send_timed_text};
pub use rich::{escape_tags, RichText, Span, Style, TextColor};
