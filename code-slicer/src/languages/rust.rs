//! Rust grammar description.

use super::LanguageSpec;

pub(crate) fn spec() -> LanguageSpec {
    LanguageSpec {
        grammar: tree_sitter_rust::LANGUAGE.into(),
        function_kinds: &["function_item", "macro_definition"],
        class_kinds: &[
            "struct_item",
            "enum_item",
            "trait_item",
            "impl_item",
            "union_item",
            "mod_item",
        ],
        wrapper_kinds: &[],
        identifier_kinds: &["identifier", "type_identifier", "field_identifier"],
        module_docstring: false,
    }
}
