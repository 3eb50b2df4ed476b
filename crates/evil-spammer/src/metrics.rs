// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, IntCounter, IntCounterVec, IntGauge, Registry,
};

use crate::errors::{SpamError, SpamErrorKind};

#[derive(Clone)]
pub struct SpammerMetrics {
    pub units_dispatched: IntCounter,
    pub units_prepared: IntCounter,
    pub items_sent: IntCounter,
    pub units_in_flight: IntGauge,
    pub errors: IntCounterVec,
}

impl SpammerMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            units_dispatched: register_int_counter_with_registry!(
                "spam_units_dispatched",
                "Total number of spam units started",
                registry,
            )?,
            units_prepared: register_int_counter_with_registry!(
                "spam_units_prepared",
                "Total number of spam units completed without error",
                registry,
            )?,
            items_sent: register_int_counter_with_registry!(
                "spam_items_sent",
                "Total number of blocks posted to nodes",
                registry,
            )?,
            units_in_flight: register_int_gauge_with_registry!(
                "spam_units_in_flight",
                "Number of spam units currently running",
                registry,
            )?,
            errors: register_int_counter_vec_with_registry!(
                "spam_errors",
                "Total number of spam errors by kind",
                &["kind"],
                registry,
            )?,
        })
    }

    pub fn record_error(&self, error: &SpamError) {
        let kind = SpamErrorKind::from(error).to_string();
        self.errors.with_label_values(&[&kind]).inc();
    }
}
