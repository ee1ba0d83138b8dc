use super::{Signature, SignatureBuf};

#[test]
fn valid_signatures() {
    for sig in [
        "",
        "y",
        "sss",
        "ai",
        "a{sv}",
        "(ii)",
        "((ii)(tt))",
        "aaaai",
        "a{s(iu)}",
        "av",
        "a{yv}",
        "vvv",
        "(yyyyuu)",
    ] {
        assert!(Signature::new(sig).is_ok(), "{sig:?} should be valid");
    }
}

#[test]
fn invalid_signatures() {
    for sig in [
        "a",
        "a{}",
        "a{s}",
        "a{svv}",
        "a{vs}",
        "()",
        "(",
        ")",
        "(i",
        "i)",
        "{sv}",
        "a{(i)v}",
        "z",
        "{",
        "}",
        "a{sv",
    ] {
        assert!(Signature::new(sig).is_err(), "{sig:?} should be invalid");
    }
}

#[test]
fn signature_too_long() {
    let long = "i".repeat(256);
    assert!(Signature::new(&long).is_err());

    let max = "i".repeat(255);
    assert!(Signature::new(&max).is_ok());
}

#[test]
fn nesting_limits() {
    // 32 arrays and 32 structs nest to exactly 64 levels.
    let deep = format!("{}{}i{}", "a".repeat(32), "(".repeat(32), ")".repeat(32));
    assert!(Signature::new(&deep).is_ok());

    let too_deep = format!("{}{}i{}", "a".repeat(33), "(".repeat(32), ")".repeat(32));
    assert!(Signature::new(&too_deep).is_err());
}

#[test]
fn iter_top_level() {
    let sig = Signature::new("ia{sv}(x(tt))as").unwrap();
    let types = sig.iter().map(Signature::as_str).collect::<Vec<_>>();
    assert_eq!(types, ["i", "a{sv}", "(x(tt))", "as"]);

    assert_eq!(Signature::EMPTY.iter().count(), 0);
}

#[test]
fn owned_push() {
    let mut sig = SignatureBuf::empty();
    sig.push(Signature::STRING).unwrap();
    sig.push(Signature::new("a{sv}").unwrap()).unwrap();
    assert_eq!(sig.as_str(), "sa{sv}");

    let mut sig = SignatureBuf::new("i".repeat(255).as_str()).unwrap();
    assert!(sig.push(Signature::UINT32).is_err());
}

#[test]
fn const_validation() {
    const SIG: &Signature = Signature::new_const(b"a{s(iu)}");
    assert_eq!(SIG.as_str(), "a{s(iu)}");
}
