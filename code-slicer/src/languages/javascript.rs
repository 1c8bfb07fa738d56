//! JavaScript grammar description.

use super::LanguageSpec;

pub(crate) fn spec() -> LanguageSpec {
    LanguageSpec {
        grammar: tree_sitter_javascript::LANGUAGE.into(),
        function_kinds: &[
            "function_declaration",
            "generator_function_declaration",
            "method_definition",
        ],
        class_kinds: &["class_declaration"],
        wrapper_kinds: &["export_statement"],
        identifier_kinds: &["identifier", "property_identifier", "shorthand_property_identifier"],
        module_docstring: false,
    }
}
