use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        AnimFrameError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        AnimFrameError::config("x")
            .to_string()
            .contains("configuration error:")
    );
    assert!(
        AnimFrameError::render("x")
            .to_string()
            .contains("render error:")
    );
    assert!(
        AnimFrameError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn io_errors_convert_with_prefix() {
    let err: AnimFrameError = std::io::Error::other("disk full").into();
    let msg = err.to_string();
    assert!(msg.starts_with("io error:"));
    assert!(msg.contains("disk full"));
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = AnimFrameError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
