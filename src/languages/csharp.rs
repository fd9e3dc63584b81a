use super::super::define_language;
use super::Language;
use crate::syntax::{NodeLabel, TypeKind};

define_language! {
    CSharp, ["cs", "csharp", "c#"], tree_sitter_c_sharp::LANGUAGE, map_node_kind
}

fn map_node_kind(_: &CSharp, node_kind: &'static str) -> NodeLabel {
    match node_kind {
        "compilation_unit" => NodeLabel::CompilationUnit,

        "namespace_declaration" | "file_scoped_namespace_declaration" => NodeLabel::Namespace,

        "class_declaration" => NodeLabel::Type(TypeKind::Class),
        "struct_declaration" => NodeLabel::Type(TypeKind::Struct),
        "interface_declaration" => NodeLabel::Type(TypeKind::Interface),
        "record_declaration" | "record_struct_declaration" => NodeLabel::Type(TypeKind::Record),
        "enum_declaration" => NodeLabel::Type(TypeKind::Enum),

        "method_declaration"
        | "destructor_declaration"
        | "operator_declaration"
        | "conversion_operator_declaration" => NodeLabel::Method,
        "constructor_declaration" => NodeLabel::Constructor,
        "property_declaration" | "indexer_declaration" | "event_declaration" => NodeLabel::Property,
        "field_declaration" | "event_field_declaration" => NodeLabel::Field,
        "enum_member_declaration" => NodeLabel::EnumMember,
        "variable_declarator" => NodeLabel::VariableDeclarator,

        "parameter_list" => NodeLabel::ParameterList,
        "parameter" => NodeLabel::Parameter,
        "type_parameter_list" => NodeLabel::TypeParameterList,
        "type_parameter" => NodeLabel::TypeParameter,
        "attribute_list" => NodeLabel::AttributeList,
        "modifier" => NodeLabel::Modifier,

        "block" => NodeLabel::Block,

        "local_declaration_statement"
        | "expression_statement"
        | "return_statement"
        | "if_statement"
        | "for_statement"
        | "while_statement"
        | "do_statement"
        | "foreach_statement"
        | "switch_statement"
        | "break_statement"
        | "continue_statement"
        | "throw_statement"
        | "yield_statement"
        | "using_statement"
        | "lock_statement"
        | "goto_statement"
        | "labeled_statement"
        | "global_statement"
        | "empty_statement" => NodeLabel::Statement,

        "try_statement" => NodeLabel::TryStatement,
        "catch_clause" => NodeLabel::CatchClause,
        "finally_clause" => NodeLabel::FinallyClause,

        "lambda_expression" | "anonymous_method_expression" => NodeLabel::Lambda,
        "local_function_statement" => NodeLabel::LocalFunction,

        "identifier" => NodeLabel::Identifier,

        "comment" => NodeLabel::Comment,

        // The grammar yields a full CST; remaining named rules and anonymous
        // tokens all participate in matching through their raw kind.
        _ => NodeLabel::Token,
    }
}
