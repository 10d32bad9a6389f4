mod record;
mod validate;

pub use record::{
    is_cjk_ideograph, single_ideograph, JlptLevel, KanjiExample, KanjiRecord,
    CJK_IDEOGRAPH_END, CJK_IDEOGRAPH_START,
};
pub use validate::{validate, validate_expecting, ValidationError};
