//! End to end tests against a running server: service calls, health,
//! reflection and the auth interceptor.

mod common;

use common::{ephemeral_config, start, FixedProvider};
use matchfn_proto::match_function_client::MatchFunctionClient;
use matchfn_proto::{
    make_matches_request, GetStatCodesRequest, MakeMatchesParameters, MakeMatchesRequest, Rules,
    Ticket, ValidateTicketRequest,
};
use std::sync::Arc;
use tonic::metadata::MetadataValue;
use tonic::{Code, Request};
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

fn ticket(id: &str) -> Ticket {
    Ticket {
        ticket_id: id.to_string(),
        match_pool: "pool".to_string(),
        players: vec![Default::default()],
        created_at: 0,
    }
}

fn with_bearer<T>(message: T, token: &str) -> Request<T> {
    let mut request = Request::new(message);
    let value: MetadataValue<_> = format!("Bearer {token}").parse().expect("metadata");
    request.metadata_mut().insert("authorization", value);
    request
}

#[tokio::test]
async fn test_unary_calls_without_auth() {
    let harness = start(ephemeral_config(), None).await;
    let mut client = MatchFunctionClient::new(harness.channel().await);

    let codes = client
        .get_stat_codes(GetStatCodesRequest { rules: None })
        .await
        .unwrap()
        .into_inner();
    assert!(codes.codes.is_empty());

    let validation = client
        .validate_ticket(ValidateTicketRequest {
            ticket: Some(ticket("t1")),
            rules: Some(Rules::default()),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(validation.valid_ticket);

    harness.stop();
}

#[tokio::test]
async fn test_health_reports_serving() {
    let harness = start(ephemeral_config(), None).await;
    let mut client = HealthClient::new(harness.channel().await);

    let response = client
        .check(HealthCheckRequest {
            service: "matchfunction.MatchFunction".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.status, ServingStatus::Serving as i32);

    harness.stop();
}

#[tokio::test]
async fn test_reflection_lists_registered_services() {
    use tonic_reflection::pb::v1::server_reflection_client::ServerReflectionClient;
    use tonic_reflection::pb::v1::server_reflection_request::MessageRequest;
    use tonic_reflection::pb::v1::server_reflection_response::MessageResponse;
    use tonic_reflection::pb::v1::ServerReflectionRequest;

    let harness = start(ephemeral_config(), None).await;
    let mut client = ServerReflectionClient::new(harness.channel().await);

    let requests = tokio_stream::iter(vec![ServerReflectionRequest {
        host: String::new(),
        message_request: Some(MessageRequest::ListServices(String::new())),
    }]);
    let mut responses = client
        .server_reflection_info(requests)
        .await
        .unwrap()
        .into_inner();

    let message = responses
        .message()
        .await
        .unwrap()
        .expect("reflection response");
    let Some(MessageResponse::ListServicesResponse(list)) = message.message_response else {
        panic!("expected a service list");
    };
    let names: Vec<_> = list.service.into_iter().map(|s| s.name).collect();
    assert!(names.contains(&"matchfunction.MatchFunction".to_string()));
    assert!(names.contains(&"grpc.health.v1.Health".to_string()));

    harness.stop();
}

#[tokio::test]
async fn test_auth_gates_every_call() {
    let mut config = ephemeral_config();
    config.auth_enabled = true;
    let provider = Arc::new(FixedProvider::new(["good-token"]));
    let harness = start(config, Some(provider)).await;
    let mut client = MatchFunctionClient::new(harness.channel().await);

    // No credential.
    let status = client
        .get_stat_codes(GetStatCodesRequest { rules: None })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    // Unknown credential.
    let status = client
        .get_stat_codes(with_bearer(
            GetStatCodesRequest { rules: None },
            "wrong-token",
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    // Valid credential.
    let codes = client
        .get_stat_codes(with_bearer(GetStatCodesRequest { rules: None }, "good-token"))
        .await
        .unwrap()
        .into_inner();
    assert!(codes.codes.is_empty());

    harness.stop();
}

#[tokio::test]
async fn test_make_matches_pairs_streamed_tickets() {
    let harness = start(ephemeral_config(), None).await;
    let mut client = MatchFunctionClient::new(harness.channel().await);

    let requests = vec![
        MakeMatchesRequest {
            request_type: Some(make_matches_request::RequestType::Parameters(
                MakeMatchesParameters {
                    rules: Some(Rules {
                        json: "{}".to_string(),
                    }),
                    scope: "session".to_string(),
                },
            )),
        },
        MakeMatchesRequest {
            request_type: Some(make_matches_request::RequestType::Ticket(ticket("t1"))),
        },
        MakeMatchesRequest {
            request_type: Some(make_matches_request::RequestType::Ticket(ticket("t2"))),
        },
        MakeMatchesRequest {
            request_type: Some(make_matches_request::RequestType::Ticket(ticket("t3"))),
        },
    ];

    let mut responses = client
        .make_matches(tokio_stream::iter(requests))
        .await
        .unwrap()
        .into_inner();

    let first = responses.message().await.unwrap().expect("one match");
    let proposal = first.r#match.expect("match payload");
    let ids: Vec<_> = proposal.tickets.iter().map(|t| t.ticket_id.clone()).collect();
    assert_eq!(ids, vec!["t1", "t2"]);

    // The odd ticket stays pooled; the stream ends without another match.
    assert!(responses.message().await.unwrap().is_none());

    harness.stop();
}

#[tokio::test]
async fn test_tickets_before_parameters_fail_the_stream() {
    let harness = start(ephemeral_config(), None).await;
    let mut client = MatchFunctionClient::new(harness.channel().await);

    let requests = vec![MakeMatchesRequest {
        request_type: Some(make_matches_request::RequestType::Ticket(ticket("t1"))),
    }];
    let mut responses = client
        .make_matches(tokio_stream::iter(requests))
        .await
        .unwrap()
        .into_inner();

    let status = responses.message().await.unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);

    harness.stop();
}
