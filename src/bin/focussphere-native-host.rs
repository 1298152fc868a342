//! Native messaging host for the FocusSphere browser companion.
//!
//! Speaks the length-prefixed JSON protocol over stdin/stdout until the
//! browser closes the pipe.

use focussphere_lib::{config::AppConfig, native_host::NativeHost, FocusSphere};
use std::io;
use std::sync::Arc;

#[allow(clippy::print_stderr, reason = "stdout carries the protocol, errors go to stderr")]
fn fail(message: &str) -> ! {
    eprintln!("Native host error: {message}");
    std::process::exit(1);
}

fn main() {
    let config = AppConfig::load_or_default().unwrap_or_else(|e| fail(&e.to_string()));
    let app = FocusSphere::open(config).unwrap_or_else(|e| fail(&e.to_string()));

    let host = NativeHost::new(Arc::clone(app.bridge()));
    let result = host.run(&mut io::stdin().lock(), &mut io::stdout().lock());
    app.shutdown();

    if let Err(e) = result {
        if e.kind() != io::ErrorKind::UnexpectedEof {
            fail(&e.to_string());
        }
    }
}
