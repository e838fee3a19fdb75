//! Display symbol to provider lookup symbol rewriting.
//!
//! The table stores Shanghai listings with the `.SH` suffix, while the quote
//! provider expects Yahoo's `.SS`. The display symbol stays the key for
//! write-back; only the provider lookup uses the rewritten form.

/// Derive the provider lookup symbol from a display symbol.
///
/// Pure and deterministic: `.SH` becomes `.SS`, everything else passes
/// through unchanged apart from trimming and uppercasing.
pub fn lookup_symbol(display: &str) -> String {
    let upper = display.trim().to_uppercase();
    match upper.rsplit_once('.') {
        Some((base, "SH")) => format!("{base}.SS"),
        _ => upper,
    }
}
