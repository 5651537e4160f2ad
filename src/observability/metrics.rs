use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub matching_cycles_total: IntCounterVec,
    pub matching_cycle_seconds: HistogramVec,
    pub rides_assigned_total: IntCounter,
    pub rides_waiting: IntGauge,
    pub stage_transitions_total: IntCounterVec,
    pub transition_rejections_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let matching_cycles_total = IntCounterVec::new(
            Opts::new("matching_cycles_total", "Matching cycles by outcome"),
            &["outcome"],
        )
        .expect("valid matching_cycles_total metric");

        let matching_cycle_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "matching_cycle_seconds",
                "Duration of one matching cycle in seconds",
            ),
            &["outcome"],
        )
        .expect("valid matching_cycle_seconds metric");

        let rides_assigned_total =
            IntCounter::new("rides_assigned_total", "Rides assigned to a unit")
                .expect("valid rides_assigned_total metric");

        let rides_waiting =
            IntGauge::new("rides_waiting", "Rides without a unit after the last cycle")
                .expect("valid rides_waiting metric");

        let stage_transitions_total = IntCounterVec::new(
            Opts::new("stage_transitions_total", "Recorded ride stages"),
            &["stage"],
        )
        .expect("valid stage_transitions_total metric");

        let transition_rejections_total = IntCounter::new(
            "transition_rejections_total",
            "Stage transitions rejected as out of order",
        )
        .expect("valid transition_rejections_total metric");

        registry
            .register(Box::new(matching_cycles_total.clone()))
            .expect("register matching_cycles_total");
        registry
            .register(Box::new(matching_cycle_seconds.clone()))
            .expect("register matching_cycle_seconds");
        registry
            .register(Box::new(rides_assigned_total.clone()))
            .expect("register rides_assigned_total");
        registry
            .register(Box::new(rides_waiting.clone()))
            .expect("register rides_waiting");
        registry
            .register(Box::new(stage_transitions_total.clone()))
            .expect("register stage_transitions_total");
        registry
            .register(Box::new(transition_rejections_total.clone()))
            .expect("register transition_rejections_total");

        Self {
            registry,
            matching_cycles_total,
            matching_cycle_seconds,
            rides_assigned_total,
            rides_waiting,
            stage_transitions_total,
            transition_rejections_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
