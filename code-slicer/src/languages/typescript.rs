//! TypeScript grammar description.

use super::LanguageSpec;

pub(crate) fn spec() -> LanguageSpec {
    LanguageSpec {
        grammar: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        function_kinds: &[
            "function_declaration",
            "generator_function_declaration",
            "method_definition",
        ],
        class_kinds: &[
            "class_declaration",
            "abstract_class_declaration",
            "interface_declaration",
            "enum_declaration",
        ],
        wrapper_kinds: &["export_statement"],
        identifier_kinds: &[
            "identifier",
            "type_identifier",
            "property_identifier",
            "shorthand_property_identifier",
        ],
        module_docstring: false,
    }
}
