use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use prometheus::{
    labels, opts, register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounterVec, IntGauge, IntGaugeVec, Registry,
};

/// Macro to prefix a string with the namespace.
macro_rules! namespaced {
    ($name:expr) => {
        format!("{}_{}", super::NAMESPACE, $name)
    };
}

/// Metrics of one orchestrator process, labelled by counterparty chain.
pub struct CoreMetrics {
    registry: Registry,
    agent_name: String,

    claims_sent: IntCounterVec,
    confirms_signed: IntCounterVec,
    submissions: IntCounterVec,
    loop_iterations: IntCounterVec,
    loop_errors: IntCounterVec,
    endpoint_reputation: IntGaugeVec,
    last_scanned_height: IntGaugeVec,
    last_observed_event_nonce: IntGaugeVec,
    running_instances: IntGauge,
}

impl CoreMetrics {
    /// Track metrics for a particular agent name.
    pub fn new(for_agent: &str, registry: Registry) -> prometheus::Result<Self> {
        let const_labels: HashMap<String, String> = labels! {
            namespaced!("baselib_version") => env!("CARGO_PKG_VERSION").into(),
            "agent".into() => for_agent.into(),
        };
        let const_labels_ref = const_labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect::<HashMap<_, _>>();

        let claims_sent = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("claims_sent_total"),
                "Claims broadcast to the home chain",
                const_labels_ref
            ),
            &["chain_id", "kind"],
            registry
        )?;

        let confirms_signed = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("confirms_signed_total"),
                "Valset and batch confirmations broadcast",
                const_labels_ref
            ),
            &["chain_id", "kind"],
            registry
        )?;

        let submissions = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("submissions_total"),
                "Valset updates and batches submitted to a counterparty chain",
                const_labels_ref
            ),
            &["chain_id", "kind"],
            registry
        )?;

        let loop_iterations = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("loop_iterations_total"),
                "Completed loop iterations",
                const_labels_ref
            ),
            &["chain_id", "loop"],
            registry
        )?;

        let loop_errors = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("loop_errors_total"),
                "Loop iterations that ended in an error or a panic",
                const_labels_ref
            ),
            &["chain_id", "loop"],
            registry
        )?;

        let endpoint_reputation = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced!("endpoint_reputation"),
                "Reputation of each counterparty endpoint",
                const_labels_ref
            ),
            &["chain_id", "endpoint"],
            registry
        )?;

        let last_scanned_height = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced!("last_scanned_height"),
                "Last counterparty block scanned by the oracle",
                const_labels_ref
            ),
            &["chain_id"],
            registry
        )?;

        let last_observed_event_nonce = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced!("last_observed_event_nonce"),
                "Last event nonce the home chain acknowledged for this orchestrator",
                const_labels_ref
            ),
            &["chain_id"],
            registry
        )?;

        let running_instances = register_int_gauge_with_registry!(
            opts!(
                namespaced!("running_instances"),
                "Orchestrator instances currently running",
                const_labels_ref
            ),
            registry
        )?;

        Ok(Self {
            registry,
            agent_name: for_agent.into(),
            claims_sent,
            confirms_signed,
            submissions,
            loop_iterations,
            loop_errors,
            endpoint_reputation,
            last_scanned_height,
            last_observed_event_nonce,
            running_instances,
        })
    }

    /// Claims broadcast to the home chain.
    /// - `chain_id`: counterparty chain.
    /// - `kind`: event kind of the claim.
    pub fn claims_sent(&self) -> IntCounterVec {
        self.claims_sent.clone()
    }

    /// Confirmations broadcast, `kind` is `valset` or `batch`.
    pub fn confirms_signed(&self) -> IntCounterVec {
        self.confirms_signed.clone()
    }

    /// Counterparty submissions, `kind` is `valset` or `batch`.
    pub fn submissions(&self) -> IntCounterVec {
        self.submissions.clone()
    }

    /// Loop iterations by loop name.
    pub fn loop_iterations(&self) -> IntCounterVec {
        self.loop_iterations.clone()
    }

    /// Failed loop iterations by loop name.
    pub fn loop_errors(&self) -> IntCounterVec {
        self.loop_errors.clone()
    }

    /// Reputation per endpoint.
    pub fn endpoint_reputation(&self) -> IntGaugeVec {
        self.endpoint_reputation.clone()
    }

    /// Oracle progress.
    pub fn last_scanned_height(&self) -> IntGaugeVec {
        self.last_scanned_height.clone()
    }

    /// Home chain acknowledgement progress.
    pub fn last_observed_event_nonce(&self) -> IntGaugeVec {
        self.last_observed_event_nonce.clone()
    }

    /// Number of running instances.
    pub fn running_instances(&self) -> IntGauge {
        self.running_instances.clone()
    }

    /// Gather available metrics into an encoded (plaintext, OpenMetrics
    /// format) report.
    pub fn gather(&self) -> prometheus::Result<Vec<u8>> {
        let collected_metrics = self.registry.gather();
        let mut out_buf = Vec::with_capacity(1024 * 64);
        let encoder = prometheus::TextEncoder::new();
        encoder.encode(&collected_metrics, &mut out_buf)?;
        Ok(out_buf)
    }

    /// Get the name of this agent, e.g. "orchestrator"
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }
}

impl Debug for CoreMetrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreMetrics")
            .field("agent_name", &self.agent_name)
            .finish()
    }
}
