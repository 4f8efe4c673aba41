use formualizer_parse::{parse, Ast, Config, Operator, Ref};

fn gs_config() -> Config {
    Config::google_sheets()
}

#[test]
fn google_sheets_profile_still_parses_default_grammar() {
    let ast = parse("=SUM(A1:A10, 5) + 2", gs_config()).unwrap();
    match ast {
        Ast::BinaryOp { op: Operator::Add, .. } => {}
        other => panic!("unexpected ast: {other:?}"),
    }
}

#[test]
fn boolean_named_expression_ambiguity_resolves_longest_match() {
    let ast = parse("=TRUECOUNT + 1", gs_config()).unwrap();
    match ast {
        Ast::BinaryOp { lhs, .. } => match *lhs {
            Ast::NamedExpression(name) => assert_eq!(name, "TRUECOUNT"),
            other => panic!("expected NamedExpression, got {other:?}"),
        },
        other => panic!("unexpected ast: {other:?}"),
    }
}

#[test]
fn two_engines_with_different_max_cols_are_isolated() {
    let mut wide = gs_config();
    wide.max_cols = 16_384;
    let mut narrow = gs_config();
    narrow.max_cols = 2; // only columns A, B

    let wide_ast = parse("=C1", wide).unwrap();
    assert!(matches!(wide_ast, Ast::CellReference(Ref::Cell { .. })));

    let narrow_ast = parse("=C1", narrow).unwrap();
    assert!(matches!(narrow_ast, Ast::NamedExpression(_)));
}

#[test]
fn nested_function_and_array_literal_parses() {
    let ast = parse("=SUM({1,2,3}) * 2", gs_config()).unwrap();
    match ast {
        Ast::BinaryOp { op: Operator::Mul, lhs, .. } => {
            assert!(matches!(*lhs, Ast::Procedure { .. }));
        }
        other => panic!("unexpected ast: {other:?}"),
    }
}

#[test]
fn comparison_chain_is_left_associative() {
    use Ast::*;
    let ast = parse("=1<2", gs_config()).unwrap();
    assert!(matches!(ast, BinaryOp { op: Operator::Lt, .. }));
}
