//! Shared test utilities for core module tests
//!
//! Provides an in-memory iptables stand-in and the listings used across the
//! engine tests. This module is only compiled in test mode.

use crate::core::backend::RuleBackend;
use crate::core::compiler::CompiledRule;
use crate::core::error::{Error, Result};
use crate::core::rule::Table;
use std::collections::HashMap;
use std::sync::Mutex;

/// Mutex for tests that need exclusive access to environment variables.
///
/// # Example
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().unwrap();
/// unsafe {
///     std::env::set_var("IPTSAFE_ELEVATION_METHOD", "sudo");
/// }
/// // ... test with custom env state ...
/// unsafe {
///     std::env::remove_var("IPTSAFE_ELEVATION_METHOD");
/// }
/// ```
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

/// `iptables -S` output of a small router's filter table
pub const FILTER_LISTING: &str = "
-P INPUT ACCEPT
-P FORWARD ACCEPT
-P OUTPUT ACCEPT
-N ROUTER-FORWARD
-A FORWARD -j ROUTER-FORWARD
-A ROUTER-FORWARD -i eth0 -o eth1 -m state --state RELATED,ESTABLISHED -j ACCEPT
-A ROUTER-FORWARD -i eth1 -o eth0 -j ACCEPT
-A ROUTER-FORWARD -i eth0 -o wlan0 -m state --state RELATED,ESTABLISHED -j ACCEPT
-A ROUTER-FORWARD -i wlan0 -o eth0 -j ACCEPT
";

/// `iptables -t nat -S` output of the same router
pub const NAT_LISTING: &str = "
-P PREROUTING ACCEPT
-P INPUT ACCEPT
-P POSTROUTING ACCEPT
-P OUTPUT ACCEPT
-N ROUTER-INGRESS
-N ROUTER-EGRESS
-A PREROUTING -j ROUTER-INGRESS
-A POSTROUTING -j ROUTER-EGRESS
-A ROUTER-INGRESS -s 192.168.5.1/32 -j RETURN
-A ROUTER-INGRESS -s 192.168.6.1/32 -j RETURN
-A ROUTER-EGRESS -o eth0 -j MASQUERADE
";

/// In-memory [`RuleBackend`].
///
/// Listings are served from per-table text; executing an `-A` rule appends
/// its canonical line to that text, so a later listing sees it the way a
/// real `iptables -S` would.
#[derive(Debug, Default)]
pub struct MockBackend {
    listings: Mutex<HashMap<Table, String>>,
    list_calls: Mutex<Vec<Table>>,
    executed: Mutex<Vec<Vec<String>>>,
    execute_attempts: Mutex<usize>,
    fail_listing: Mutex<Option<Table>>,
    fail_execute_at: Mutex<Option<usize>>,
}

impl MockBackend {
    pub fn with_listings(filter: &str, nat: &str) -> Self {
        let backend = Self::default();
        {
            let mut listings = backend.listings.lock().unwrap();
            listings.insert(Table::Filter, filter.to_string());
            listings.insert(Table::Nat, nat.to_string());
        }
        backend
    }

    /// Backend serving [`FILTER_LISTING`] and [`NAT_LISTING`].
    pub fn router() -> Self {
        Self::with_listings(FILTER_LISTING, NAT_LISTING)
    }

    /// Makes every listing of `table` fail from now on.
    pub fn fail_listing(&self, table: Table) {
        *self.fail_listing.lock().unwrap() = Some(table);
    }

    /// Makes the `index`-th (0-based) execute call fail.
    pub fn fail_execute_at(&self, index: usize) {
        *self.fail_execute_at.lock().unwrap() = Some(index);
    }

    pub fn list_calls(&self) -> Vec<Table> {
        self.list_calls.lock().unwrap().clone()
    }

    /// Full argv of every successfully executed rule, in order.
    pub fn executed(&self) -> Vec<Vec<String>> {
        self.executed.lock().unwrap().clone()
    }

    pub fn listing(&self, table: Table) -> String {
        self.listings
            .lock()
            .unwrap()
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }
}

impl RuleBackend for MockBackend {
    async fn list_rules(&self, table: Table) -> Result<String> {
        self.list_calls.lock().unwrap().push(table);

        if *self.fail_listing.lock().unwrap() == Some(table) {
            return Err(Error::Execution {
                message: "iptables failure".to_string(),
                stderr: Some("iptables failure".to_string()),
                exit_code: Some(1),
            });
        }

        Ok(self.listing(table))
    }

    async fn execute(&self, rule: &CompiledRule) -> Result<()> {
        let attempt = {
            let mut attempts = self.execute_attempts.lock().unwrap();
            let current = *attempts;
            *attempts += 1;
            current
        };

        if *self.fail_execute_at.lock().unwrap() == Some(attempt) {
            return Err(Error::Execution {
                message: "iptables: No chain/target/match by that name.".to_string(),
                stderr: Some("iptables: No chain/target/match by that name.".to_string()),
                exit_code: Some(1),
            });
        }

        self.executed.lock().unwrap().push(rule.argv());

        if rule.args().first().is_some_and(|flag| flag == "-A") {
            let mut listings = self.listings.lock().unwrap();
            let listing = listings.entry(rule.table()).or_default();
            listing.push_str(&rule.canonical());
            listing.push('\n');
        }

        Ok(())
    }
}
