// Enable pedantic lints globally, then allow the noisy ones we're not fixing.
#![warn(clippy::pedantic, clippy::nursery)]
// --- Intentionally allowed ---
// Getters everywhere; adding #[must_use] to each is noise
#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]
// DSP variable names (high_pass vs low_pass, wet1 vs wet2, etc.) are intentionally similar
#![allow(clippy::similar_names)]
// Per-sample processing loops read best unsplit
#![allow(clippy::too_many_lines)]
// Audio code performs intentional casts
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap
)]
// Errors are anyhow contexts; no need for doc sections
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]
// Style/pedantic lints that add noise without value here
#![allow(
    clippy::module_name_repetitions,
    clippy::items_after_statements,
    clippy::option_if_let_else,
    clippy::doc_markdown,
    clippy::float_cmp,
    clippy::match_same_arms,
    clippy::struct_field_names,
    clippy::needless_pass_by_value,
    clippy::unnecessary_wraps,
    clippy::if_not_else,
    clippy::match_wildcard_for_single_variants,
    clippy::single_match_else,
    clippy::unnested_or_patterns,
    clippy::trivially_copy_pass_by_ref
)]
// Nursery lints that are too noisy or not applicable
#![allow(clippy::redundant_pub_crate, clippy::significant_drop_tightening)]

pub mod audio;
pub mod fx;
pub mod settings;
