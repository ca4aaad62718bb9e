/*! Integration tests for Tally.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - auth: session issuance, login/registration and the guard
 * - bus: the update bus and live feed
 * - store: the Store trait against every configured backend
 * - web: the HTTP surface, end to end over a real socket
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("tally=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod auth;
mod bus;
mod web;
