//! REST transport tests
//!
//! Request shapes, response decoding and error mapping against a mock HTTP
//! server.

#[cfg(test)]
mod tests {
    use crate::assert_ok;
    use crate::common::fixtures::{self, article};
    use serde_json::{Value, json};
    use uuid::Uuid;
    use vecbatch::config::{ClientConfig, ConsistencyLevel};
    use vecbatch::core::batch::DispatchOutcome;
    use vecbatch::{BatchClient, BatchError, BatchTransport, ReferenceItem, RestTransport};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn transport(server: &MockServer) -> RestTransport {
        let config = ClientConfig {
            url: server.uri(),
            ..ClientConfig::default()
        };
        RestTransport::new(&config).unwrap()
    }

    /// Answers a batch write with one entry per object, newest first, failing
    /// objects whose title is "reject"
    struct EchoObjects;

    impl Respond for EchoObjects {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: Value = request.body_json().unwrap_or_default();
            let mut entries: Vec<Value> = body["objects"]
                .as_array()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|object| {
                    let result = if object["properties"]["title"] == "reject" {
                        json!({ "errors": { "error": [{ "message": "invalid object" }] } })
                    } else {
                        json!({})
                    };
                    json!({ "id": object["id"], "class": object["class"], "result": result })
                })
                .collect();
            entries.reverse();
            ResponseTemplate::new(200).set_body_json(Value::Array(entries))
        }
    }

    // ==================== Object Batch Tests ====================

    #[tokio::test]
    async fn test_send_objects_request_shape() {
        let server = MockServer::start().await;
        let object = article(0).with_vector(vec![0.5, 0.25]).with_tenant("acme");
        let id = object.uuid.unwrap();

        Mock::given(method("POST"))
            .and(path("/v1/batch/objects"))
            .and(body_partial_json(json!({
                "objects": [{
                    "class": "Article",
                    "id": id.to_string(),
                    "properties": { "n": 0 },
                    "vector": [0.5, 0.25],
                    "tenant": "acme"
                }]
            })))
            .respond_with(EchoObjects)
            .expect(1)
            .mount(&server)
            .await;

        let outcomes = assert_ok!(transport(&server).send_objects(&[object]).await);
        assert_eq!(outcomes, vec![DispatchOutcome::Success]);
    }

    #[tokio::test]
    async fn test_send_objects_realigns_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/batch/objects"))
            .respond_with(EchoObjects)
            .mount(&server)
            .await;

        let mut rejected = article(1);
        rejected.properties["title"] = json!("reject");
        let objects = vec![article(0), rejected, article(2)];

        let outcomes = assert_ok!(transport(&server).send_objects(&objects).await);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_success());
        assert!(matches!(&outcomes[1], DispatchOutcome::Error(e) if e.message == "invalid object"));
        assert!(outcomes[2].is_success());
    }

    #[tokio::test]
    async fn test_consistency_level_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/batch/objects"))
            .and(query_param("consistency_level", "QUORUM"))
            .and(header("authorization", "Bearer secret-key"))
            .respond_with(EchoObjects)
            .expect(1)
            .mount(&server)
            .await;

        let config = ClientConfig {
            url: server.uri(),
            api_key: Some("secret-key".to_string()),
            consistency_level: Some(ConsistencyLevel::Quorum),
            ..ClientConfig::default()
        };
        let transport = RestTransport::new(&config).unwrap();

        let outcomes = assert_ok!(transport.send_objects(&[article(0)]).await);
        assert!(outcomes[0].is_success());
    }

    #[tokio::test]
    async fn test_server_error_is_remote() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/batch/objects"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let err = transport(&server)
            .send_objects(&[article(0)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BatchError::Remote { status: 500, ref message } if message.contains("internal error")
        ));
    }

    #[tokio::test]
    async fn test_short_response_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/batch/objects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "result": {} }])))
            .mount(&server)
            .await;

        let result = transport(&server)
            .send_objects(&[article(0), article(1)])
            .await;
        assert!(result.is_err());
    }

    // ==================== Reference Batch Tests ====================

    #[tokio::test]
    async fn test_send_references_positional() {
        let server = MockServer::start().await;
        let (from, to) = (Uuid::new_v4(), Uuid::new_v4());

        Mock::given(method("POST"))
            .and(path("/v1/batch/references"))
            .and(body_partial_json(json!([{
                "from": format!("weaviate://localhost/Article/{}/author", from),
                "to": format!("weaviate://localhost/Author/{}", to)
            }])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "result": { "status": "SUCCESS" } },
                { "result": { "errors": { "error": [{ "message": "target not found" }] } } }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let references = vec![
            fixtures::authored_by(from, to),
            ReferenceItem::new("Article", Uuid::new_v4(), "author", Uuid::new_v4()),
        ];
        let outcomes = assert_ok!(transport(&server).send_references(&references).await);
        assert!(outcomes[0].is_success());
        assert!(matches!(&outcomes[1], DispatchOutcome::Error(e) if e.message == "target not found"));
    }

    // ==================== Lookup Tests ====================

    #[tokio::test]
    async fn test_object_exists() {
        let server = MockServer::start().await;
        let (present, absent) = (Uuid::new_v4(), Uuid::new_v4());

        Mock::given(method("HEAD"))
            .and(path(format!("/v1/objects/Article/{}", present)))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path(format!("/v1/objects/Article/{}", absent)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let transport = transport(&server);
        assert!(assert_ok!(transport.object_exists("Article", present, None).await));
        assert!(!assert_ok!(transport.object_exists("Article", absent, None).await));
    }

    #[tokio::test]
    async fn test_get_object() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path(format!("/v1/objects/Article/{}", id)))
            .and(query_param("include", "vector"))
            .and(query_param("tenant", "acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "class": "Article",
                "id": id.to_string(),
                "properties": { "title": "hello" },
                "vector": [1.0, 0.0],
                "tenant": "acme"
            })))
            .mount(&server)
            .await;

        let transport = transport(&server);
        let object = assert_ok!(transport.get_object("Article", id, Some("acme")).await).unwrap();
        assert_eq!(object.id, id);
        assert_eq!(object.properties["title"], "hello");
        assert_eq!(object.vector, Some(vec![1.0, 0.0]));

        // Anything not mounted answers 404
        let missing = assert_ok!(transport.get_object("Article", Uuid::new_v4(), None).await);
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_shards() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/schema/Article/shards"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "name": "a1", "status": "READY", "vectorQueueSize": 42 },
                { "name": "a2", "status": "READY", "vectorQueueSize": 0 }
            ])))
            .mount(&server)
            .await;

        let shards = assert_ok!(transport(&server).shards("Article", None).await);
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].vector_queue_size, 42);
        assert!(shards[1].is_drained());
    }

    // ==================== Health Tests ====================

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/.well-known/ready"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert_ok!(transport(&server).health_check().await);
    }

    #[tokio::test]
    async fn test_health_check_not_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/.well-known/ready"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = transport(&server).health_check().await.unwrap_err();
        assert!(matches!(err, BatchError::Remote { status: 503, .. }));
    }

    // ==================== Client Over REST ====================

    #[tokio::test]
    async fn test_client_session_over_rest() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/batch/objects"))
            .respond_with(EchoObjects)
            .expect(2)
            .mount(&server)
            .await;

        let mut config = fixtures::config(5, 1);
        config.client.url = server.uri();
        let client = BatchClient::from_config(config).unwrap();

        let (_, summary) = assert_ok!(
            client
                .with_session(async |session| {
                    for n in 0..8 {
                        let mut object = article(n);
                        if n == 6 {
                            object.properties["title"] = json!("reject");
                        }
                        session.add_object(object).await?;
                    }
                    Ok(())
                })
                .await
        );

        assert_eq!(summary.succeeded, 7);
        assert_eq!(summary.failed, 1);
        assert_eq!(client.failed_objects()[0].error.message, "invalid object");
    }
}
