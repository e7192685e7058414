//! Prometheus collectors for the consensus core

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

pub static PROM_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn counter(name: &str, help: &str) -> IntCounter {
    let c = IntCounter::new(name, help).expect("static metric name is valid");
    let _ = PROM_REGISTRY.register(Box::new(c.clone()));
    c
}

fn gauge(name: &str, help: &str) -> IntGauge {
    let g = IntGauge::new(name, help).expect("static metric name is valid");
    let _ = PROM_REGISTRY.register(Box::new(g.clone()));
    g
}

pub static PROM_POB_BLOCKS_ADDED: Lazy<IntCounter> =
    Lazy::new(|| counter("pob_blocks_added_total", "Blocks attached to the fork tree"));
pub static PROM_POB_ORPHANS: Lazy<IntCounter> =
    Lazy::new(|| counter("pob_orphan_blocks_total", "Blocks whose parent was unknown on arrival"));
pub static PROM_POB_VERIFY_FAILURES: Lazy<IntCounter> =
    Lazy::new(|| counter("pob_verify_failures_total", "Blocks rejected by verification"));
pub static PROM_POB_BLOCKS_PROMOTED: Lazy<IntCounter> =
    Lazy::new(|| counter("pob_blocks_promoted_total", "Blocks confirmed into the chain store"));
pub static PROM_POB_BLOCKS_PRODUCED: Lazy<IntCounter> =
    Lazy::new(|| counter("pob_blocks_produced_total", "Blocks produced by the local witness"));
pub static PROM_POB_NOTIFY_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "pob_notify_dropped_total",
        "Confirmed-block events dropped after the notify timeout",
    )
});
pub static PROM_POB_CONFIRMED_LENGTH: Lazy<IntGauge> =
    Lazy::new(|| gauge("pob_confirmed_length", "Blocks in the chain store, genesis included"));
pub static PROM_POB_CACHE_NODES: Lazy<IntGauge> =
    Lazy::new(|| gauge("pob_cache_nodes", "Nodes in the fork tree, root included"));

pub static PROM_POB_TXPOOL_SIZE: Lazy<IntGauge> =
    Lazy::new(|| gauge("pob_txpool_pending", "Transactions waiting for inclusion"));

/// Render every collector in the text exposition format.
pub fn gather_text() -> String {
    Lazy::force(&PROM_POB_BLOCKS_ADDED);
    Lazy::force(&PROM_POB_ORPHANS);
    Lazy::force(&PROM_POB_VERIFY_FAILURES);
    Lazy::force(&PROM_POB_BLOCKS_PROMOTED);
    Lazy::force(&PROM_POB_BLOCKS_PRODUCED);
    Lazy::force(&PROM_POB_NOTIFY_DROPPED);
    Lazy::force(&PROM_POB_CONFIRMED_LENGTH);
    Lazy::force(&PROM_POB_CACHE_NODES);
    Lazy::force(&PROM_POB_TXPOOL_SIZE);

    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&PROM_REGISTRY.gather(), &mut buf) {
        tracing::warn!(target = "pob::metrics", error = %e, "metrics encode failed");
    }
    String::from_utf8(buf).unwrap_or_default()
}
