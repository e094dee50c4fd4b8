//! Request validation built on the `validator` crate.

mod extractor;
mod validators;

pub use extractor::{ValidatedJson, ValidatedQuery};
pub use validators::{
    parse_month, validate_hex_color, validate_invite_code, validate_month, validate_not_blank,
    validate_tags,
};
