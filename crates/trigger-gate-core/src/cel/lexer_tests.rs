//! Tests for the CEL tokenizer.

use super::*;

fn tokens(source: &str) -> Vec<Token> {
    tokenize(source)
        .unwrap()
        .into_iter()
        .map(|s| s.token)
        .collect()
}

#[test]
fn test_operators_and_punctuation() {
    assert_eq!(
        tokens("a.b[0] == 1 && !c || d != e"),
        vec![
            Token::Ident("a".into()),
            Token::Dot,
            Token::Ident("b".into()),
            Token::LBracket,
            Token::Int(0),
            Token::RBracket,
            Token::EqEq,
            Token::Int(1),
            Token::AndAnd,
            Token::Not,
            Token::Ident("c".into()),
            Token::OrOr,
            Token::Ident("d".into()),
            Token::NotEq,
            Token::Ident("e".into()),
            Token::Eof,
        ]
    );
}

#[test]
fn test_numbers() {
    assert_eq!(
        tokens("42 0x1F 3.5 1e3 2.5e-1 .5"),
        vec![
            Token::Int(42),
            Token::Int(31),
            Token::Double(3.5),
            Token::Double(1000.0),
            Token::Double(0.25),
            Token::Double(0.5),
            Token::Eof,
        ]
    );
}

#[test]
fn test_unsigned_literals_are_rejected() {
    let err = tokenize("1u").unwrap_err();

    assert!(matches!(err, CelError::Syntax { position: 0, .. }));
}

#[test]
fn test_string_escapes() {
    assert_eq!(
        tokens(r#"'a\'b' "tab\there" '\x41é\101'"#),
        vec![
            Token::String("a'b".into()),
            Token::String("tab\there".into()),
            Token::String("AéA".into()),
            Token::Eof,
        ]
    );
}

#[test]
fn test_raw_triple_and_bytes_literals() {
    assert_eq!(
        tokens(r#"r'\d+' '''multi'line''' b'\xff' rb'\x'"#),
        vec![
            Token::String("\\d+".into()),
            Token::String("multi'line".into()),
            Token::Bytes(vec![0xff]),
            Token::Bytes(b"\\x".to_vec()),
            Token::Eof,
        ]
    );
}

#[test]
fn test_keywords() {
    assert_eq!(
        tokens("true false null in"),
        vec![Token::True, Token::False, Token::Null, Token::In, Token::Eof]
    );
}

#[test]
fn test_reserved_words_are_rejected() {
    assert!(tokenize("if").is_err());
    assert!(tokenize("body.var").is_err());
}

#[test]
fn test_comments_are_skipped() {
    assert_eq!(
        tokens("1 // trailing comment\n+ 2"),
        vec![Token::Int(1), Token::Plus, Token::Int(2), Token::Eof]
    );
}

#[test]
fn test_unterminated_string() {
    assert!(matches!(
        tokenize("'abc"),
        Err(CelError::Syntax { position: 0, .. })
    ));
}

#[test]
fn test_unexpected_character_reports_position() {
    match tokenize("a # b") {
        Err(CelError::Syntax { position, message }) => {
            assert_eq!(position, 2);
            assert!(message.contains('#'));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
