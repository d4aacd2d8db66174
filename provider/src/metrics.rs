use cadence::{prelude::*, StatsdClient, UdpMetricSink};
use faas_provider_core::Stats;
use std::net::UdpSocket;

const PREFIX: &str = "faas.nomad";

/// statsd-backed [`Stats`] sink. Sends are fire-and-forget; a dropped
/// datagram must never fail a request.
pub(crate) struct Statsd {
    client: StatsdClient,
}

// === impl Statsd ===

impl Statsd {
    pub fn new(addr: &str) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;
        let sink = UdpMetricSink::from(addr, socket)?;
        Ok(Self {
            client: StatsdClient::from_sink(PREFIX, sink),
        })
    }
}

impl Stats for Statsd {
    fn incr(&self, name: &str, tags: &[(&str, &str)]) {
        let mut metric = self.client.count_with_tags(name, 1);
        for (key, value) in tags {
            metric = metric.with_tag(key, value);
        }
        metric.try_send().ok();
    }

    fn gauge(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        let mut metric = self.client.gauge_with_tags(name, value);
        for (key, value) in tags {
            metric = metric.with_tag(key, value);
        }
        metric.try_send().ok();
    }
}
