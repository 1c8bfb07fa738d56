//! Python grammar description.

use super::LanguageSpec;

pub(crate) fn spec() -> LanguageSpec {
    LanguageSpec {
        grammar: tree_sitter_python::LANGUAGE.into(),
        function_kinds: &["function_definition"],
        class_kinds: &["class_definition"],
        wrapper_kinds: &["decorated_definition"],
        identifier_kinds: &["identifier"],
        module_docstring: true,
    }
}
