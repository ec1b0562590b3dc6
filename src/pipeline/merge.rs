//! Document merging: combine the markup and stylesheet partitions into one
//! self-contained document the renderer can load in a single navigation.
//!
//! The stylesheet is always inlined rather than referenced — pooled renderer
//! sessions abort subresource requests, so an external `<link>` would never
//! resolve.

use crate::error::PlatenError;

/// Merge markup and stylesheet content into a single document.
///
/// * both partitions whitespace-only → [`PlatenError::EmptyInput`]
/// * markup empty → a minimal wrapper document embedding the stylesheet, so
///   style-only submissions still yield a visible artifact
/// * markup with a `</head>` → stylesheet inlined immediately before the
///   first head close
/// * markup without a head → stylesheet prepended as an inline style
/// * no stylesheet → markup passes through unchanged
pub fn merge_document(markup: &str, styles: &str) -> Result<String, PlatenError> {
    if markup.trim().is_empty() && styles.trim().is_empty() {
        return Err(PlatenError::EmptyInput);
    }
    if markup.trim().is_empty() {
        return Ok(style_only_document(styles));
    }
    if styles.is_empty() {
        return Ok(markup.to_owned());
    }

    let inline = format!("<style>{styles}</style>");
    if markup.contains("</head>") {
        Ok(markup.replacen("</head>", &format!("{inline}</head>"), 1))
    } else {
        Ok(format!("{inline}{markup}"))
    }
}

/// Wrapper for stylesheet-only submissions.
fn style_only_document(styles: &str) -> String {
    format!(
        "<html><head><title>Stylesheet preview</title><style>{styles}</style></head>\
         <body><h1>Stylesheet preview</h1></body></html>"
    )
}
