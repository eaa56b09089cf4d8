// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Corvid Contributors
//
// This file is part of Corvid.
//
// Corvid is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Corvid is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Corvid. If not, see <https://www.gnu.org/licenses/>.

//! In-memory broker backend
//!
//! Routes deliveries between queues held in process. Faithful to the wire
//! contract (headers, correlation ids, exchange semantics) but with none of
//! the durability a real broker provides. Used by tests and by single
//! process deployments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use crate::broker::{
    Broker, BrokerError, RoutedHeartbeat, RoutedPublication, RoutedRequest, RoutedResponse,
};
use crate::Delivery;

const QUEUE_DEPTH: usize = 1024;

const HEARTBEAT_PRIORITY: u8 = 5;

#[derive(Default)]
struct Routing {
    /// Queue name → sender side of its consume channel
    queues: HashMap<String, mpsc::Sender<Delivery>>,
    /// Request exchange bindings: service → queue
    services: HashMap<String, String>,
    /// Topic exchange bindings: topic → queues
    topics: HashMap<String, Vec<String>>,
}

/// A broker that lives entirely in this process.
pub struct InMemoryBroker {
    routing: RwLock<Routing>,
    connected: AtomicBool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            routing: RwLock::new(Routing::default()),
            connected: AtomicBool::new(true),
        }
    }

    async fn deliver(&self, queue: &str, delivery: Delivery) {
        let sender = {
            let routing = self.routing.read().await;
            routing.queues.get(queue).cloned()
        };
        match sender {
            // A full or closed queue drops the message, as a real broker
            // with an expiring queue would.
            Some(tx) => {
                if tx.try_send(delivery).is_err() {
                    tracing::warn!(queue, "dropping delivery, queue full or gone");
                }
            }
            None => {
                tracing::debug!(queue, "dropping delivery, no such queue");
            }
        }
    }

    fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn send_request(
        &self,
        req: &(dyn RoutedRequest + '_),
        instance_id: &str,
    ) -> Result<(), BrokerError> {
        self.ensure_connected()?;

        let queue = {
            let routing = self.routing.read().await;
            routing.services.get(req.service()).cloned()
        };
        let Some(queue) = queue else {
            // No binding: the exchange accepts the publish and the message
            // goes nowhere, exactly like an unbound AMQP exchange.
            tracing::debug!(service = req.service(), "no binding for service");
            return Ok(());
        };

        let mut headers = HashMap::new();
        headers.insert("messageType".into(), "request".into());
        headers.insert("service".into(), req.service().into());
        headers.insert("endpoint".into(), req.endpoint().into());
        headers.insert("traceID".into(), req.trace_id().into());
        headers.insert(
            "traceShouldPersist".into(),
            if req.trace_should_persist() { "1" } else { "0" }.into(),
        );
        headers.insert("sessionID".into(), req.session_id().into());
        headers.insert("parentMessageID".into(), req.parent_message_id().into());
        headers.insert("from".into(), req.from().into());
        headers.insert("remoteAddr".into(), req.remote_addr().into());
        headers.insert(
            "authorised".into(),
            if req.authorised() { "1" } else { "0" }.into(),
        );

        self.deliver(
            &queue,
            Delivery {
                content_type: req.content_type().into(),
                body: req.payload().to_vec(),
                headers,
                message_id: req.message_id().into(),
                correlation_id: String::new(),
                reply_to: instance_id.into(),
                priority: 0,
            },
        )
        .await;
        Ok(())
    }

    async fn send_response(
        &self,
        rsp: &(dyn RoutedResponse + '_),
        instance_id: &str,
    ) -> Result<(), BrokerError> {
        self.ensure_connected()?;

        let mut headers = HashMap::new();
        headers.insert("messageType".into(), rsp.message_type().into());

        self.deliver(
            rsp.reply_to(),
            Delivery {
                content_type: rsp.content_type().into(),
                body: rsp.payload().to_vec(),
                headers,
                message_id: String::new(),
                // the original message id becomes the correlation id
                correlation_id: rsp.message_id().into(),
                reply_to: instance_id.into(),
                priority: 0,
            },
        )
        .await;
        Ok(())
    }

    async fn send_publication(
        &self,
        publication: &(dyn RoutedPublication + '_),
        instance_id: &str,
    ) -> Result<(), BrokerError> {
        self.ensure_connected()?;

        let queues = {
            let routing = self.routing.read().await;
            routing
                .topics
                .get(publication.topic())
                .cloned()
                .unwrap_or_default()
        };

        for queue in queues {
            let mut headers = HashMap::new();
            headers.insert("messageType".into(), "publication".into());
            headers.insert("topic".into(), publication.topic().into());
            headers.insert("sessionID".into(), publication.session_id().into());

            self.deliver(
                &queue,
                Delivery {
                    content_type: publication.content_type().into(),
                    body: publication.payload().to_vec(),
                    headers,
                    message_id: publication.message_id().into(),
                    correlation_id: String::new(),
                    reply_to: instance_id.into(),
                    priority: 0,
                },
            )
            .await;
        }
        Ok(())
    }

    async fn send_heartbeat(
        &self,
        hb: &(dyn RoutedHeartbeat + '_),
        instance_id: &str,
    ) -> Result<(), BrokerError> {
        self.ensure_connected()?;

        let mut headers = HashMap::new();
        headers.insert("messageType".into(), "heartbeat".into());
        headers.insert("heartbeat".into(), "ping".into());

        self.deliver(
            hb.id(),
            Delivery {
                content_type: hb.content_type().into(),
                body: hb.payload().to_vec(),
                headers,
                message_id: String::new(),
                correlation_id: String::new(),
                reply_to: instance_id.into(),
                priority: HEARTBEAT_PRIORITY,
            },
        )
        .await;
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>, BrokerError> {
        self.ensure_connected()?;

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let mut routing = self.routing.write().await;
        // Redeclaring an existing queue replaces its consumer; the old
        // receiver sees its channel close.
        routing.queues.insert(queue.to_string(), tx);
        tracing::debug!(queue, "consuming");
        Ok(rx)
    }

    async fn bind_service(&self, service: &str, queue: &str) -> Result<(), BrokerError> {
        self.ensure_connected()?;

        let mut routing = self.routing.write().await;
        if !routing.queues.contains_key(queue) {
            return Err(BrokerError::Queue(
                queue.to_string(),
                "cannot bind undeclared queue".to_string(),
            ));
        }
        routing
            .services
            .insert(service.to_string(), queue.to_string());
        Ok(())
    }

    async fn bind_topic(&self, topic: &str, queue: &str) -> Result<(), BrokerError> {
        self.ensure_connected()?;

        let mut routing = self.routing.write().await;
        if !routing.queues.contains_key(queue) {
            return Err(BrokerError::Queue(
                queue.to_string(),
                "cannot bind undeclared queue".to_string(),
            ));
        }
        let queues = routing.topics.entry(topic.to_string()).or_default();
        if !queues.iter().any(|q| q == queue) {
            queues.push(queue.to_string());
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let mut routing = self.routing.write().await;
        routing.queues.clear();
        routing.services.clear();
        routing.topics.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestRequest {
        payload: Vec<u8>,
    }

    impl RoutedRequest for TestRequest {
        fn content_type(&self) -> &str {
            crate::ContentKind::OCTET_STREAM
        }
        fn payload(&self) -> &[u8] {
            &self.payload
        }
        fn service(&self) -> &str {
            "com.corvid.test"
        }
        fn endpoint(&self) -> &str {
            "echo"
        }
        fn message_id(&self) -> &str {
            "msg-1"
        }
        fn session_id(&self) -> &str {
            ""
        }
        fn trace_id(&self) -> &str {
            ""
        }
        fn trace_should_persist(&self) -> bool {
            false
        }
        fn parent_message_id(&self) -> &str {
            ""
        }
        fn from(&self) -> &str {
            "com.corvid.caller"
        }
        fn remote_addr(&self) -> &str {
            ""
        }
        fn authorised(&self) -> bool {
            true
        }
    }

    struct TestPublication;

    impl RoutedPublication for TestPublication {
        fn content_type(&self) -> &str {
            crate::ContentKind::OCTET_STREAM
        }
        fn payload(&self) -> &[u8] {
            b"event"
        }
        fn topic(&self) -> &str {
            "com.corvid.topic.test"
        }
        fn message_id(&self) -> &str {
            "pub-1"
        }
        fn session_id(&self) -> &str {
            ""
        }
    }

    #[tokio::test]
    async fn request_routes_to_bound_service_queue() {
        let broker = InMemoryBroker::new();
        let mut rx = broker.consume("server-instance").await.unwrap();
        broker
            .bind_service("com.corvid.test", "server-instance")
            .await
            .unwrap();

        broker
            .send_request(
                &TestRequest {
                    payload: b"hello".to_vec(),
                },
                "client-instance",
            )
            .await
            .unwrap();

        let d = rx.recv().await.unwrap();
        assert_eq!(d.header("messageType"), "request");
        assert_eq!(d.header("service"), "com.corvid.test");
        assert_eq!(d.header("endpoint"), "echo");
        assert_eq!(d.header("authorised"), "1");
        assert_eq!(d.message_id, "msg-1");
        assert_eq!(d.reply_to, "client-instance");
        assert_eq!(d.body, b"hello");
    }

    #[tokio::test]
    async fn request_to_unbound_service_is_dropped() {
        let broker = InMemoryBroker::new();
        assert!(broker
            .send_request(
                &TestRequest {
                    payload: b"x".to_vec()
                },
                "client"
            )
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn publication_fans_out_to_every_bound_queue() {
        let broker = InMemoryBroker::new();
        let mut rx1 = broker.consume("q1").await.unwrap();
        let mut rx2 = broker.consume("q2").await.unwrap();
        broker.bind_topic("com.corvid.topic.test", "q1").await.unwrap();
        broker.bind_topic("com.corvid.topic.test", "q2").await.unwrap();

        broker
            .send_publication(&TestPublication, "publisher")
            .await
            .unwrap();

        let d1 = rx1.recv().await.unwrap();
        let d2 = rx2.recv().await.unwrap();
        assert_eq!(d1.header("topic"), "com.corvid.topic.test");
        assert_eq!(d2.body, b"event");
    }

    #[tokio::test]
    async fn bind_requires_declared_queue() {
        let broker = InMemoryBroker::new();
        assert!(broker.bind_service("svc", "nope").await.is_err());
        assert!(broker.bind_topic("topic", "nope").await.is_err());
    }

    #[tokio::test]
    async fn disconnect_rejects_operations() {
        let broker = InMemoryBroker::new();
        broker.disconnect().await;
        assert!(!broker.is_connected());
        assert!(broker.consume("q").await.is_err());
    }
}
