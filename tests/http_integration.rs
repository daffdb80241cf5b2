//! Integration tests for the OTC client using wiremock
//!
//! A mock server plays both the identity service and the VPC/CSS/DeH APIs;
//! the token catalog points every service back at it.

use otc_modules::config::{AuthConfig, CloudConfig};
use otc_modules::otc::client::OtcClient;
use otc_modules::vpc::{PeeringAttributes, PeeringRecord, VpcApi, VpcRef};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "gAAAAABtoken";
const PROJECT: &str = "proj-1";

fn catalog_entry(service_type: &str, url: &str) -> Value {
    json!({
        "type": service_type,
        "endpoints": [
            {"interface": "public", "region": "eu-de", "url": url}
        ]
    })
}

/// Mount a Keystone token endpoint that issues `TOKEN` scoped to `PROJECT`
async fn mount_keystone(server: &MockServer) {
    let uri = server.uri();
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("X-Subject-Token", TOKEN)
                .set_body_json(json!({
                    "token": {
                        "expires_at": "2099-01-01T00:00:00.000000Z",
                        "project": {"id": PROJECT, "name": "eu-de_test"},
                        "catalog": [
                            catalog_entry("network", &uri),
                            catalog_entry("css", &format!("{}/v1.0/{}", uri, PROJECT)),
                            catalog_entry("deh", &format!("{}/v1.0/{}", uri, PROJECT)),
                        ]
                    }
                })),
        )
        .mount(server)
        .await;
}

fn password_client(server: &MockServer) -> OtcClient {
    let config = CloudConfig {
        region_name: Some("eu-de".into()),
        auth: AuthConfig {
            auth_url: Some(format!("{}/v3", server.uri())),
            username: Some("user".into()),
            password: Some("secret".into()),
            user_domain_name: Some("OTC-EU-DE-000000000010000".into()),
            project_name: Some("eu-de_test".into()),
            ..Default::default()
        },
        ..Default::default()
    };
    OtcClient::new(&config).expect("client should build")
}

async fn setup() -> (MockServer, OtcClient) {
    let server = MockServer::start().await;
    mount_keystone(&server).await;
    let client = password_client(&server);
    (server, client)
}

fn peering_json(id: &str, name: &str, local: &str, peer: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "status": "ACTIVE",
        "request_vpc_info": {"vpc_id": local, "tenant_id": PROJECT},
        "accept_vpc_info": {"vpc_id": peer, "tenant_id": PROJECT}
    })
}

mod auth_tests {
    use super::*;

    /// The token is issued once and reused for later calls
    #[tokio::test]
    async fn test_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("X-Subject-Token", TOKEN)
                    .set_body_json(json!({
                        "token": {
                            "expires_at": "2099-01-01T00:00:00.000000Z",
                            "project": {"id": PROJECT},
                            "catalog": [catalog_entry("network", &server.uri())]
                        }
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2.0/vpc/peerings"))
            .and(header("X-Auth-Token", TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"peerings": []})))
            .expect(2)
            .mount(&server)
            .await;

        let client = password_client(&server);
        assert!(client.list_peerings().await.unwrap().is_empty());
        assert!(client.list_peerings().await.unwrap().is_empty());
        assert_eq!(client.current_project_id().await.unwrap(), PROJECT);
    }

    #[tokio::test]
    async fn test_rejected_credentials_surface_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": 401, "message": "The request you have made requires authentication."}
            })))
            .mount(&server)
            .await;

        let client = password_client(&server);
        let err = client.list_peerings().await.unwrap_err();
        let msg = format!("{:#}", err);

        assert!(msg.contains("Authentication failed"), "got: {}", msg);
        assert!(msg.contains("requires authentication"), "got: {}", msg);
    }
}

mod vpc_api_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_peerings_follows_next_links() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/v2.0/vpc/peerings"))
            .and(query_param("marker", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "peerings": [peering_json("p3", "third", "c", "d")],
                "peerings_links": [{"rel": "previous", "href": "ignored"}]
            })))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2.0/vpc/peerings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "peerings": [
                    peering_json("p1", "first", "a", "b"),
                    peering_json("p2", "second", "b", "c")
                ],
                "peerings_links": [
                    {"rel": "next", "href": format!("{}/v2.0/vpc/peerings?marker=p2", server.uri())}
                ]
            })))
            .mount(&server)
            .await;

        let peerings = client.list_peerings().await.unwrap();
        let ids: Vec<&str> = peerings.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_find_peering_by_id() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/v2.0/vpc/peerings/p1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"peering": peering_json("p1", "first", "a", "b")})),
            )
            .mount(&server)
            .await;

        let found = client.find_peering("p1").await.unwrap().unwrap();
        assert_eq!(found.name, "first");
        assert_eq!(found.peer_vpc_info.vpc_id, "b");
    }

    #[tokio::test]
    async fn test_find_peering_falls_back_to_name() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/v2.0/vpc/peerings/first"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "NeutronError": {"message": "Peering first could not be found"}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2.0/vpc/peerings"))
            .and(query_param("name", "first"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "peerings": [peering_json("p1", "first", "a", "b")]
            })))
            .mount(&server)
            .await;

        let found = client.find_peering("first").await.unwrap();
        assert_eq!(found.map(|p| p.id), Some("p1".to_string()));
    }

    #[tokio::test]
    async fn test_find_peering_absent_is_none() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/v2.0/vpc/peerings"))
            .and(query_param("name", "ghost"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"peerings": []})))
            .mount(&server)
            .await;

        assert!(client.find_peering("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ambiguous_name_is_an_error() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/v2.0/routers"))
            .and(query_param("name", "shared"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "routers": [{"id": "r1", "name": "shared"}, {"id": "r2", "name": "shared"}]
            })))
            .mount(&server)
            .await;

        let err = client.find_router("shared").await.unwrap_err();
        assert!(err.to_string().contains("More than one router"));
    }

    /// Rows the server returns for a looser name match are not counted
    #[tokio::test]
    async fn test_find_router_keeps_exact_name_only() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/v2.0/routers"))
            .and(query_param("name", "vpc-a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "routers": [
                    {"id": "r1", "name": "vpc-a"},
                    {"id": "r2", "name": "vpc-a-backup"},
                    {"id": "r3", "name": "VPC-A"}
                ]
            })))
            .mount(&server)
            .await;

        let router = client.find_router("vpc-a").await.unwrap().unwrap();
        assert_eq!(router.id, "r1");
    }

    #[tokio::test]
    async fn test_create_peering_sends_envelope() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .and(path("/v2.0/vpc/peerings"))
            .and(header("X-Auth-Token", TOKEN))
            .and(body_json(json!({
                "peering": {
                    "name": "peering1",
                    "request_vpc_info": {"vpc_id": "local-id", "tenant_id": "P1"},
                    "accept_vpc_info": {"vpc_id": "remote-id", "tenant_id": "P2"}
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "peering": {
                    "id": "new-id",
                    "name": "peering1",
                    "status": "PENDING_ACCEPTANCE",
                    "request_vpc_info": {"vpc_id": "local-id", "tenant_id": "P1"},
                    "accept_vpc_info": {"vpc_id": "remote-id", "tenant_id": "P2"}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let attrs = PeeringAttributes {
            name: "peering1".into(),
            local_vpc_info: VpcRef {
                vpc_id: "local-id".into(),
                tenant_id: Some("P1".into()),
            },
            peer_vpc_info: VpcRef {
                vpc_id: "remote-id".into(),
                tenant_id: Some("P2".into()),
            },
        };
        let created = client.create_peering(&attrs).await.unwrap();
        assert_eq!(created.id, "new-id");
        assert_eq!(created.status, "PENDING_ACCEPTANCE");
    }

    #[tokio::test]
    async fn test_provider_rejection_passes_through() {
        let (server, client) = setup().await;

        Mock::given(method("DELETE"))
            .and(path("/v2.0/vpc/peerings/p1"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "NeutronError": {"message": "Peering p1 is in use"}
            })))
            .mount(&server)
            .await;

        let record = PeeringRecord {
            id: "p1".into(),
            ..Default::default()
        };
        let err = client.delete_peering(&record).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "API request failed: 409 Conflict: Peering p1 is in use"
        );
    }
}

mod reconcile_tests {
    use super::*;
    use otc_modules::vpc::{DesiredState, PeeringReconciler, PeeringRequest};
    use otc_modules::ModuleError;

    async fn mount_router(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v2.0/routers"))
            .and(query_param("name", "local-router"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "routers": [{"id": "local-id", "name": "local-router", "status": "ACTIVE"}]
            })))
            .mount(server)
            .await;
    }

    fn request() -> PeeringRequest {
        PeeringRequest {
            name: Some("peering1".into()),
            state: DesiredState::Present,
            local_router: Some("local-router".into()),
            local_project: Some(PROJECT.into()),
            remote_router: Some("remote-router-id".into()),
            remote_project: Some(PROJECT.into()),
            ..Default::default()
        }
    }

    /// Lookup misses, router resolves, no duplicate: exactly one create
    #[tokio::test]
    async fn test_create_against_api() {
        let (server, client) = setup().await;
        mount_router(&server).await;

        Mock::given(method("GET"))
            .and(path("/v2.0/vpc/peerings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"peerings": []})))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v2.0/vpc/peerings"))
            .and(body_json(json!({
                "peering": {
                    "name": "peering1",
                    "request_vpc_info": {"vpc_id": "local-id"},
                    "accept_vpc_info": {"vpc_id": "remote-router-id"}
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "peering": peering_json("new-id", "peering1", "local-id", "remote-router-id")
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = PeeringReconciler::new(&client)
            .reconcile(&request())
            .await
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.peering.unwrap().id, "new-id");
    }

    #[tokio::test]
    async fn test_reverse_pair_is_conflict_without_post() {
        let (server, client) = setup().await;
        mount_router(&server).await;

        Mock::given(method("GET"))
            .and(path("/v2.0/vpc/peerings"))
            .and(query_param("name", "peering1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"peerings": []})))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2.0/vpc/peerings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "peerings": [peering_json("old", "other", "remote-router-id", "local-id")]
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v2.0/vpc/peerings"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let err = PeeringReconciler::new(&client)
            .reconcile(&request())
            .await
            .unwrap_err();

        assert!(matches!(err, ModuleError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_check_mode_sends_no_delete() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/v2.0/vpc/peerings/p1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"peering": peering_json("p1", "first", "a", "b")})),
            )
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let request = PeeringRequest {
            id: Some("p1".into()),
            state: DesiredState::Absent,
            ..Default::default()
        };
        let outcome = PeeringReconciler::new(&client)
            .check_mode(true)
            .reconcile(&request)
            .await
            .unwrap();

        assert!(outcome.changed);
        assert!(outcome.peering.is_none());
    }
}

mod info_module_tests {
    use super::*;
    use otc_modules::css::{cluster_info, ClusterInfoParams};
    use otc_modules::deh::{host_info, HostInfoParams, HostStatus};

    #[tokio::test]
    async fn test_css_lists_with_paging_params() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path(format!("/v1.0/{}/clusters", PROJECT)))
            .and(query_param("start", "2"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "clusters": [{"id": "c1", "name": "es-1"}, {"id": "c2", "name": "es-2"}]
            })))
            .mount(&server)
            .await;

        let params = ClusterInfoParams {
            start: 2,
            limit: Some(5),
            ..Default::default()
        };
        let info = cluster_info(&client, &params).await.unwrap();

        assert!(!info.changed);
        assert_eq!(info.clusters.len(), 2);
    }

    #[tokio::test]
    async fn test_css_find_by_name() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path(format!("/v1.0/{}/clusters", PROJECT)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "clusters": [{"id": "c1", "name": "es-1"}, {"id": "c2", "name": "es-2"}]
            })))
            .mount(&server)
            .await;

        let params = ClusterInfoParams {
            name: Some("es-2".into()),
            ..Default::default()
        };
        let info = cluster_info(&client, &params).await.unwrap();

        assert_eq!(info.clusters, vec![json!({"id": "c2", "name": "es-2"})]);
    }

    #[tokio::test]
    async fn test_deh_unknown_host_is_empty_success() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path(format!("/v1.0/{}/dedicated-hosts", PROJECT)))
            .and(query_param("name", "missing"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"dedicated_hosts": []})),
            )
            .mount(&server)
            .await;

        let params = HostInfoParams {
            host: Some("missing".into()),
            ..Default::default()
        };
        let info = host_info(&client, &params).await.unwrap();

        assert!(info.deh_hosts.is_empty());
        assert_eq!(
            info.msg.as_deref(),
            Some("No DEH host found with name or id: missing")
        );
    }

    #[tokio::test]
    async fn test_deh_filters_become_query() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path(format!("/v1.0/{}/dedicated-hosts/h-1", PROJECT)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "dedicated_host": {"dedicated_host_id": "h-1", "name": "host-a"}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("/v1.0/{}/dedicated-hosts", PROJECT)))
            .and(query_param("dedicated_host_id", "h-1"))
            .and(query_param("state", "available"))
            .and(query_param("tags", "env=prod,team=db"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "dedicated_hosts": [{"dedicated_host_id": "h-1", "name": "host-a", "state": "available"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let params = HostInfoParams {
            host: Some("h-1".into()),
            status: Some(HostStatus::Available),
            tags: vec!["env=prod".into(), "team=db".into()],
            ..Default::default()
        };
        let info = host_info(&client, &params).await.unwrap();

        assert_eq!(info.deh_hosts.len(), 1);
        assert!(info.msg.is_none());
    }
}
