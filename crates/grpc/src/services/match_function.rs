//! MatchFunction service implementation.
//!
//! The service adapts the [`Matchmaker`] decision logic to the plugin
//! contract. `MakeMatches` keeps a per-stream ticket pool: the first
//! message must carry the parameters, every following ticket message is
//! validated, pooled and drained into proposed matches.

use matchfn_proto::match_function_server::MatchFunction;
use matchfn_proto::{
    make_matches_request, GetStatCodesRequest, MakeMatchesRequest, MatchResponse, Rules,
    StatCodesResponse, ValidateTicketRequest, ValidateTicketResponse,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};

use crate::matchmaker::Matchmaker;

const MATCH_CHANNEL_CAPACITY: usize = 64;

pub struct MatchFunctionService {
    matchmaker: Arc<dyn Matchmaker>,
}

impl MatchFunctionService {
    pub fn new(matchmaker: Arc<dyn Matchmaker>) -> Self {
        Self { matchmaker }
    }
}

#[tonic::async_trait]
impl MatchFunction for MatchFunctionService {
    async fn get_stat_codes(
        &self,
        request: Request<GetStatCodesRequest>,
    ) -> Result<Response<StatCodesResponse>, Status> {
        let rules = request.into_inner().rules.unwrap_or_default();
        let codes = self.matchmaker.stat_codes(&rules);
        debug!(count = codes.len(), "stat codes requested");
        Ok(Response::new(StatCodesResponse { codes }))
    }

    async fn validate_ticket(
        &self,
        request: Request<ValidateTicketRequest>,
    ) -> Result<Response<ValidateTicketResponse>, Status> {
        let message = request.into_inner();
        let ticket = message
            .ticket
            .ok_or_else(|| Status::invalid_argument("ticket is required"))?;
        let rules = message.rules.unwrap_or_default();
        let valid_ticket = self.matchmaker.validate_ticket(&ticket, &rules);
        debug!(ticket_id = %ticket.ticket_id, valid = valid_ticket, "ticket validated");
        Ok(Response::new(ValidateTicketResponse { valid_ticket }))
    }

    type MakeMatchesStream = ReceiverStream<Result<MatchResponse, Status>>;

    async fn make_matches(
        &self,
        request: Request<Streaming<MakeMatchesRequest>>,
    ) -> Result<Response<Self::MakeMatchesStream>, Status> {
        let mut inbound = request.into_inner();
        let matchmaker = Arc::clone(&self.matchmaker);
        let (tx, rx) = mpsc::channel(MATCH_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut rules: Option<Rules> = None;
            let mut pool = Vec::new();

            loop {
                let message = match inbound.message().await {
                    Ok(Some(message)) => message,
                    Ok(None) => break,
                    Err(status) => {
                        warn!(error = %status, "match request stream failed");
                        break;
                    }
                };

                match message.request_type {
                    Some(make_matches_request::RequestType::Parameters(params)) => {
                        debug!(scope = %params.scope, "match parameters received");
                        rules = Some(params.rules.unwrap_or_default());
                    }
                    Some(make_matches_request::RequestType::Ticket(ticket)) => {
                        let Some(rules) = rules.as_ref() else {
                            let status =
                                Status::failed_precondition("parameters must precede tickets");
                            let _ = tx.send(Err(status)).await;
                            return;
                        };
                        if !matchmaker.validate_ticket(&ticket, rules) {
                            debug!(ticket_id = %ticket.ticket_id, "invalid ticket dropped");
                            continue;
                        }
                        pool.push(ticket);
                        for proposal in matchmaker.make_matches(&mut pool, rules) {
                            let response = MatchResponse {
                                r#match: Some(proposal),
                            };
                            if tx.send(Ok(response)).await.is_err() {
                                // Orchestrator went away.
                                return;
                            }
                        }
                    }
                    None => {
                        let _ = tx
                            .send(Err(Status::invalid_argument("empty match request")))
                            .await;
                        return;
                    }
                }
            }

            info!(leftover = pool.len(), "match stream closed");
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
