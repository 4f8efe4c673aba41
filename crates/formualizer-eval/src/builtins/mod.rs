//! Function kernels (C10–C15) plus the two registration entry points the
//! `FunctionRegistry` constructor calls (`spec.md` §4.6, §4.10–§4.15).
//!
//! Each submodule owns one component share from `spec.md` §2: `array`
//! (C10), `stats` (C11), `financial` (C12), `text` (C13), `operators`
//! (C14), `info` (C15). A function that Google Sheets overrides with
//! different semantics registers itself into both `register_default` and
//! `register_google_sheets_overrides`; most of this core's functions are
//! google-sheets-native and only ever register into the overlay layer,
//! since the "default" dialect is not itself a deliverable of this crate
//! (`spec.md` §1 frames the googleSheets overlay as the point).

pub mod array;
pub mod financial;
pub mod helpers;
pub mod info;
pub mod operators;
pub mod stats;
pub mod text;

use crate::registry::FunctionRegistry;

pub fn register_default(reg: &mut FunctionRegistry) {
    operators::register_default(reg);
}

pub fn register_google_sheets_overrides(reg: &mut FunctionRegistry) {
    array::register(reg);
    stats::register(reg);
    financial::register(reg);
    text::register(reg);
    operators::register_google_sheets(reg);
    info::register(reg);
}
