use super::*;

#[test]
fn every_code_round_trips() {
    for code in 0..CHAR_CODES {
        let ch = to_char(code).expect("codes below 56 are all printable");
        assert_eq!(to_byte(ch), Some(code), "code {} ('{}')", code, ch);
    }
}

#[test]
fn high_codes_are_unprintable() {
    for code in CHAR_CODES..=63 {
        assert_eq!(to_char(code), None);
    }
}

#[test]
fn spot_checks() {
    assert_eq!(to_char(0), Some(' '));
    assert_eq!(to_char(1), Some('A'));
    assert_eq!(to_char(10), Some('^'));
    assert_eq!(to_char(30), Some('0'));
    assert_eq!(to_char(39), Some('9'));
    assert_eq!(to_char(55), Some('\''));
    assert_eq!(to_byte('Z'), Some(29));
    assert_eq!(to_byte('a'), None);
    assert_eq!(to_byte('%'), None);
}
