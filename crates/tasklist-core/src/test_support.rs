//! Helpers shared by in-crate tests.

/// Mock HTTP servers need a loopback listener; some sandboxes forbid it.
pub(crate) fn can_bind_localhost() -> bool {
    let ok = std::net::TcpListener::bind("127.0.0.1:0").is_ok();
    if !ok {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
    }
    ok
}
