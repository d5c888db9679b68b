//! Resource-domain APIs: identity, networking, data, keys, messaging,
//! registry, compute, scheduling and logging.

use reqwest::Method;
use serde_json::{Value, json};

use crate::error::{ClientError, ClientFuture};
use crate::project::clients::{
    ComputeClient, Connector, ConnectorSpec, CryptoKey, Database, DatastoreClient, Firewall,
    FirewallSpec, IamPolicy, IdentityClient, IndexSpec, JobSpec, KeyManagementClient, KeyRing,
    LogSink, LoggingClient, MessagingClient, Network, NetworkClient, RegistryClient, Repository,
    SchedulerClient, SchedulerJob, Service, ServiceAccount, ServiceSpec, SinkSpec, Subnet,
    SubnetSpec, Subscription, SubscriptionSpec, Topic,
};
use crate::project::operation::Operation;

use super::GcpRestClient;
use super::endpoints::{
    ARTIFACT_REGISTRY, COMPUTE, FIRESTORE, IAM, KMS, LOGGING, PUBSUB, RESOURCE_MANAGER, RUN,
    SCHEDULER, VPC_ACCESS,
};
use super::wire::{
    ConnectorWire, CreateIndexRequest, DatabaseWire, IndexListWire, IndexWire, JobWire,
    KeyVersionListWire, NamedWire, NetworkWire, PolicyWire, ServiceAccountWire, ServiceWire,
    SetPolicyRequest, SinkWire, SubnetWire, SubscriptionWire,
};

const DEFAULT_DATABASE: &str = "(default)";
const PUSH_ACK_DEADLINE_SECS: u32 = 60;

impl GcpRestClient {
    async fn get_policy(&self, url: &str) -> Result<IamPolicy, ClientError> {
        let wire: PolicyWire = self.send_json(Method::POST, url, &json!({})).await?;
        Ok(wire.into())
    }

    async fn set_policy(&self, url: &str, policy: &IamPolicy) -> Result<IamPolicy, ClientError> {
        let wire: PolicyWire = self
            .send_json(Method::POST, url, &SetPolicyRequest::new(policy))
            .await?;
        Ok(wire.into())
    }

    async fn delete_unit(&self, url: &str) -> Result<(), ClientError> {
        self.delete(url).await.map(|_| ())
    }
}

fn service_body(spec: &ServiceSpec) -> Value {
    let env: Vec<Value> = spec
        .env
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();
    let mut template = json!({
        "serviceAccount": spec.service_account,
        "timeout": format!("{}s", spec.timeout_secs),
        "scaling": {
            "minInstanceCount": spec.min_instances,
            "maxInstanceCount": spec.max_instances,
        },
        "containers": [{ "image": spec.image, "env": env }],
    });
    if let (Some(connector), Some(fields)) = (spec.connector.as_ref(), template.as_object_mut()) {
        fields.insert(
            String::from("vpcAccess"),
            json!({ "connector": connector, "egress": "PRIVATE_RANGES_ONLY" }),
        );
    }
    json!({ "template": template, "ingress": "INGRESS_TRAFFIC_ALL" })
}

impl IdentityClient for GcpRestClient {
    fn get_service_account<'a>(
        &'a self,
        project: &'a str,
        account_id: &'a str,
    ) -> ClientFuture<'a, ServiceAccount> {
        Box::pin(async move {
            let email = format!("{account_id}@{project}.iam.gserviceaccount.com");
            let wire: ServiceAccountWire = self
                .get_json(&format!("{IAM}/projects/{project}/serviceAccounts/{email}"))
                .await?;
            Ok(wire.into())
        })
    }

    fn create_service_account<'a>(
        &'a self,
        project: &'a str,
        account_id: &'a str,
        display_name: &'a str,
    ) -> ClientFuture<'a, ServiceAccount> {
        Box::pin(async move {
            let wire: ServiceAccountWire = self
                .send_json(
                    Method::POST,
                    &format!("{IAM}/projects/{project}/serviceAccounts"),
                    &json!({
                        "accountId": account_id,
                        "serviceAccount": { "displayName": display_name },
                    }),
                )
                .await?;
            Ok(wire.into())
        })
    }

    fn delete_service_account<'a>(
        &'a self,
        project: &'a str,
        email: &'a str,
    ) -> ClientFuture<'a, ()> {
        Box::pin(async move {
            self.delete_unit(&format!("{IAM}/projects/{project}/serviceAccounts/{email}"))
                .await
        })
    }

    fn get_project_policy<'a>(&'a self, project: &'a str) -> ClientFuture<'a, IamPolicy> {
        Box::pin(async move {
            self.get_policy(&format!("{RESOURCE_MANAGER}/projects/{project}:getIamPolicy"))
                .await
        })
    }

    fn set_project_policy<'a>(
        &'a self,
        project: &'a str,
        policy: &'a IamPolicy,
    ) -> ClientFuture<'a, IamPolicy> {
        Box::pin(async move {
            self.set_policy(
                &format!("{RESOURCE_MANAGER}/projects/{project}:setIamPolicy"),
                policy,
            )
            .await
        })
    }
}

impl NetworkClient for GcpRestClient {
    fn get_network<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, Network> {
        Box::pin(async move {
            let wire: NetworkWire = self
                .get_json(&format!("{COMPUTE}/projects/{project}/global/networks/{name}"))
                .await?;
            Ok(wire.into())
        })
    }

    fn insert_network<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation(
                Method::POST,
                &format!("{COMPUTE}/projects/{project}/global/networks"),
                Some(&json!({ "name": name, "autoCreateSubnetworks": false })),
                COMPUTE,
            )
            .await
        })
    }

    fn delete_network<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation::<()>(
                Method::DELETE,
                &format!("{COMPUTE}/projects/{project}/global/networks/{name}"),
                None,
                COMPUTE,
            )
            .await
        })
    }

    fn get_subnet<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Subnet> {
        Box::pin(async move {
            let wire: SubnetWire = self
                .get_json(&format!(
                    "{COMPUTE}/projects/{project}/regions/{region}/subnetworks/{name}"
                ))
                .await?;
            Ok(wire.into())
        })
    }

    fn insert_subnet<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        spec: &'a SubnetSpec,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation(
                Method::POST,
                &format!("{COMPUTE}/projects/{project}/regions/{region}/subnetworks"),
                Some(&json!({
                    "name": spec.name,
                    "network": spec.network,
                    "ipCidrRange": spec.cidr,
                    "privateIpGoogleAccess": true,
                })),
                COMPUTE,
            )
            .await
        })
    }

    fn delete_subnet<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation::<()>(
                Method::DELETE,
                &format!("{COMPUTE}/projects/{project}/regions/{region}/subnetworks/{name}"),
                None,
                COMPUTE,
            )
            .await
        })
    }

    fn get_firewall<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, Firewall> {
        Box::pin(async move {
            let wire: NamedWire = self
                .get_json(&format!("{COMPUTE}/projects/{project}/global/firewalls/{name}"))
                .await?;
            Ok(Firewall {
                name: wire.into_name(),
            })
        })
    }

    fn insert_firewall<'a>(
        &'a self,
        project: &'a str,
        spec: &'a FirewallSpec,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation(
                Method::POST,
                &format!("{COMPUTE}/projects/{project}/global/firewalls"),
                Some(&json!({
                    "name": spec.name,
                    "network": spec.network,
                    "direction": "EGRESS",
                    "allowed": [{ "IPProtocol": "all" }],
                    "destinationRanges": ["0.0.0.0/0"],
                })),
                COMPUTE,
            )
            .await
        })
    }

    fn delete_firewall<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation::<()>(
                Method::DELETE,
                &format!("{COMPUTE}/projects/{project}/global/firewalls/{name}"),
                None,
                COMPUTE,
            )
            .await
        })
    }

    fn get_connector<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Connector> {
        Box::pin(async move {
            let wire: ConnectorWire = self
                .get_json(&format!(
                    "{VPC_ACCESS}/projects/{project}/locations/{region}/connectors/{name}"
                ))
                .await?;
            Ok(wire.into())
        })
    }

    fn create_connector<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        spec: &'a ConnectorSpec,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation(
                Method::POST,
                &format!(
                    "{VPC_ACCESS}/projects/{project}/locations/{region}/connectors?connectorId={}",
                    spec.name
                ),
                Some(&json!({ "network": spec.network, "ipCidrRange": spec.cidr })),
                VPC_ACCESS,
            )
            .await
        })
    }

    fn delete_connector<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation::<()>(
                Method::DELETE,
                &format!("{VPC_ACCESS}/projects/{project}/locations/{region}/connectors/{name}"),
                None,
                VPC_ACCESS,
            )
            .await
        })
    }
}

impl DatastoreClient for GcpRestClient {
    fn get_database<'a>(&'a self, project: &'a str) -> ClientFuture<'a, Database> {
        Box::pin(async move {
            let wire: DatabaseWire = self
                .get_json(&format!(
                    "{FIRESTORE}/projects/{project}/databases/{DEFAULT_DATABASE}"
                ))
                .await?;
            Ok(wire.into())
        })
    }

    fn create_database<'a>(
        &'a self,
        project: &'a str,
        location: &'a str,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation(
                Method::POST,
                &format!("{FIRESTORE}/projects/{project}/databases?databaseId={DEFAULT_DATABASE}"),
                Some(&json!({ "locationId": location, "type": "FIRESTORE_NATIVE" })),
                FIRESTORE,
            )
            .await
        })
    }

    fn delete_database<'a>(&'a self, project: &'a str) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation::<()>(
                Method::DELETE,
                &format!("{FIRESTORE}/projects/{project}/databases/{DEFAULT_DATABASE}"),
                None,
                FIRESTORE,
            )
            .await
        })
    }

    fn list_indexes<'a>(&'a self, project: &'a str) -> ClientFuture<'a, Vec<IndexSpec>> {
        Box::pin(async move {
            let wire: IndexListWire = self
                .get_json(&format!(
                    "{FIRESTORE}/projects/{project}/databases/{DEFAULT_DATABASE}/collectionGroups/-/indexes"
                ))
                .await?;
            Ok(wire
                .indexes
                .into_iter()
                .filter_map(IndexWire::into_spec)
                .collect())
        })
    }

    fn create_index<'a>(
        &'a self,
        project: &'a str,
        index: &'a IndexSpec,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation(
                Method::POST,
                &format!(
                    "{FIRESTORE}/projects/{project}/databases/{DEFAULT_DATABASE}/collectionGroups/{}/indexes",
                    index.collection
                ),
                Some(&CreateIndexRequest::new(index)),
                FIRESTORE,
            )
            .await
        })
    }
}

impl KeyManagementClient for GcpRestClient {
    fn get_key_ring<'a>(
        &'a self,
        project: &'a str,
        location: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, KeyRing> {
        Box::pin(async move {
            let wire: NamedWire = self
                .get_json(&format!(
                    "{KMS}/projects/{project}/locations/{location}/keyRings/{name}"
                ))
                .await?;
            Ok(wire.into())
        })
    }

    fn create_key_ring<'a>(
        &'a self,
        project: &'a str,
        location: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, KeyRing> {
        Box::pin(async move {
            let wire: NamedWire = self
                .send_json(
                    Method::POST,
                    &format!(
                        "{KMS}/projects/{project}/locations/{location}/keyRings?keyRingId={name}"
                    ),
                    &json!({}),
                )
                .await?;
            Ok(wire.into())
        })
    }

    fn get_crypto_key<'a>(
        &'a self,
        key_ring: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, CryptoKey> {
        Box::pin(async move {
            let wire: NamedWire = self
                .get_json(&format!("{KMS}/{key_ring}/cryptoKeys/{name}"))
                .await?;
            Ok(wire.into())
        })
    }

    fn create_crypto_key<'a>(
        &'a self,
        key_ring: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, CryptoKey> {
        Box::pin(async move {
            let wire: NamedWire = self
                .send_json(
                    Method::POST,
                    &format!("{KMS}/{key_ring}/cryptoKeys?cryptoKeyId={name}"),
                    &json!({ "purpose": "ENCRYPT_DECRYPT" }),
                )
                .await?;
            Ok(wire.into())
        })
    }

    fn destroy_key_versions<'a>(&'a self, crypto_key: &'a str) -> ClientFuture<'a, ()> {
        Box::pin(async move {
            let mut page_token: Option<String> = None;
            loop {
                let mut url =
                    format!("{KMS}/{crypto_key}/cryptoKeyVersions?filter=state%3DENABLED");
                if let Some(token) = page_token.as_deref() {
                    url.push_str("&pageToken=");
                    url.push_str(token);
                }
                let page: KeyVersionListWire = self.get_json(&url).await?;
                for version in page.crypto_key_versions {
                    let _: Value = self
                        .send_json(
                            Method::POST,
                            &format!("{KMS}/{}:destroy", version.into_name()),
                            &json!({}),
                        )
                        .await?;
                }
                match page.next_page_token.filter(|token| !token.is_empty()) {
                    Some(token) => page_token = Some(token),
                    None => return Ok(()),
                }
            }
        })
    }
}

impl MessagingClient for GcpRestClient {
    fn get_topic<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, Topic> {
        Box::pin(async move {
            let wire: NamedWire = self
                .get_json(&format!("{PUBSUB}/projects/{project}/topics/{name}"))
                .await?;
            Ok(wire.into())
        })
    }

    fn create_topic<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, Topic> {
        Box::pin(async move {
            let wire: NamedWire = self
                .send_json(
                    Method::PUT,
                    &format!("{PUBSUB}/projects/{project}/topics/{name}"),
                    &json!({}),
                )
                .await?;
            Ok(wire.into())
        })
    }

    fn delete_topic<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, ()> {
        Box::pin(async move {
            self.delete_unit(&format!("{PUBSUB}/projects/{project}/topics/{name}"))
                .await
        })
    }

    fn get_subscription<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Subscription> {
        Box::pin(async move {
            let wire: SubscriptionWire = self
                .get_json(&format!("{PUBSUB}/projects/{project}/subscriptions/{name}"))
                .await?;
            Ok(wire.into())
        })
    }

    fn create_subscription<'a>(
        &'a self,
        project: &'a str,
        spec: &'a SubscriptionSpec,
    ) -> ClientFuture<'a, Subscription> {
        Box::pin(async move {
            let wire: SubscriptionWire = self
                .send_json(
                    Method::PUT,
                    &format!("{PUBSUB}/projects/{project}/subscriptions/{}", spec.name),
                    &json!({
                        "topic": spec.topic,
                        "ackDeadlineSeconds": PUSH_ACK_DEADLINE_SECS,
                        "pushConfig": {
                            "pushEndpoint": spec.push_endpoint,
                            "oidcToken": { "serviceAccountEmail": spec.push_service_account },
                        },
                    }),
                )
                .await?;
            Ok(wire.into())
        })
    }

    fn delete_subscription<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, ()> {
        Box::pin(async move {
            self.delete_unit(&format!("{PUBSUB}/projects/{project}/subscriptions/{name}"))
                .await
        })
    }

    fn get_topic_policy<'a>(&'a self, topic: &'a str) -> ClientFuture<'a, IamPolicy> {
        Box::pin(async move {
            let wire: PolicyWire = self
                .get_json(&format!("{PUBSUB}/{topic}:getIamPolicy"))
                .await?;
            Ok(wire.into())
        })
    }

    fn set_topic_policy<'a>(
        &'a self,
        topic: &'a str,
        policy: &'a IamPolicy,
    ) -> ClientFuture<'a, IamPolicy> {
        Box::pin(async move {
            self.set_policy(&format!("{PUBSUB}/{topic}:setIamPolicy"), policy)
                .await
        })
    }
}

impl RegistryClient for GcpRestClient {
    fn get_repository<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Repository> {
        Box::pin(async move {
            let wire: NamedWire = self
                .get_json(&format!(
                    "{ARTIFACT_REGISTRY}/projects/{project}/locations/{region}/repositories/{name}"
                ))
                .await?;
            Ok(wire.into())
        })
    }

    fn create_repository<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation(
                Method::POST,
                &format!(
                    "{ARTIFACT_REGISTRY}/projects/{project}/locations/{region}/repositories?repositoryId={name}"
                ),
                Some(&json!({ "format": "DOCKER" })),
                ARTIFACT_REGISTRY,
            )
            .await
        })
    }

    fn delete_repository<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation::<()>(
                Method::DELETE,
                &format!(
                    "{ARTIFACT_REGISTRY}/projects/{project}/locations/{region}/repositories/{name}"
                ),
                None,
                ARTIFACT_REGISTRY,
            )
            .await
        })
    }
}

impl ComputeClient for GcpRestClient {
    fn get_service<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Service> {
        Box::pin(async move {
            let wire: ServiceWire = self
                .get_json(&format!(
                    "{RUN}/projects/{project}/locations/{region}/services/{name}"
                ))
                .await?;
            Ok(wire.into())
        })
    }

    fn create_service<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        spec: &'a ServiceSpec,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation(
                Method::POST,
                &format!(
                    "{RUN}/projects/{project}/locations/{region}/services?serviceId={}",
                    spec.name
                ),
                Some(&service_body(spec)),
                RUN,
            )
            .await
        })
    }

    fn update_service<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        spec: &'a ServiceSpec,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation(
                Method::PATCH,
                &format!(
                    "{RUN}/projects/{project}/locations/{region}/services/{}",
                    spec.name
                ),
                Some(&service_body(spec)),
                RUN,
            )
            .await
        })
    }

    fn delete_service<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, Operation> {
        Box::pin(async move {
            self.operation::<()>(
                Method::DELETE,
                &format!("{RUN}/projects/{project}/locations/{region}/services/{name}"),
                None,
                RUN,
            )
            .await
        })
    }

    fn get_service_policy<'a>(&'a self, service: &'a str) -> ClientFuture<'a, IamPolicy> {
        Box::pin(async move {
            let wire: PolicyWire = self
                .get_json(&format!("{RUN}/{service}:getIamPolicy"))
                .await?;
            Ok(wire.into())
        })
    }

    fn set_service_policy<'a>(
        &'a self,
        service: &'a str,
        policy: &'a IamPolicy,
    ) -> ClientFuture<'a, IamPolicy> {
        Box::pin(async move {
            self.set_policy(&format!("{RUN}/{service}:setIamPolicy"), policy)
                .await
        })
    }
}

impl SchedulerClient for GcpRestClient {
    fn get_job<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, SchedulerJob> {
        Box::pin(async move {
            let wire: JobWire = self
                .get_json(&format!(
                    "{SCHEDULER}/projects/{project}/locations/{region}/jobs/{name}"
                ))
                .await?;
            Ok(wire.into())
        })
    }

    fn create_job<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        spec: &'a JobSpec,
    ) -> ClientFuture<'a, SchedulerJob> {
        Box::pin(async move {
            let wire: JobWire = self
                .send_json(
                    Method::POST,
                    &format!("{SCHEDULER}/projects/{project}/locations/{region}/jobs"),
                    &json!({
                        "name": format!("projects/{project}/locations/{region}/jobs/{}", spec.name),
                        "schedule": spec.schedule,
                        "timeZone": "Etc/UTC",
                        "httpTarget": {
                            "uri": spec.target_uri,
                            "httpMethod": "POST",
                            "oidcToken": { "serviceAccountEmail": spec.service_account },
                        },
                    }),
                )
                .await?;
            Ok(wire.into())
        })
    }

    fn delete_job<'a>(
        &'a self,
        project: &'a str,
        region: &'a str,
        name: &'a str,
    ) -> ClientFuture<'a, ()> {
        Box::pin(async move {
            self.delete_unit(&format!(
                "{SCHEDULER}/projects/{project}/locations/{region}/jobs/{name}"
            ))
            .await
        })
    }
}

impl LoggingClient for GcpRestClient {
    fn get_sink<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, LogSink> {
        Box::pin(async move {
            let wire: SinkWire = self
                .get_json(&format!("{LOGGING}/projects/{project}/sinks/{name}"))
                .await?;
            Ok(wire.into())
        })
    }

    fn create_sink<'a>(
        &'a self,
        project: &'a str,
        spec: &'a SinkSpec,
    ) -> ClientFuture<'a, LogSink> {
        Box::pin(async move {
            let wire: SinkWire = self
                .send_json(
                    Method::POST,
                    &format!("{LOGGING}/projects/{project}/sinks?uniqueWriterIdentity=true"),
                    &json!({
                        "name": spec.name,
                        "destination": spec.destination,
                        "filter": spec.filter,
                    }),
                )
                .await?;
            Ok(wire.into())
        })
    }

    fn delete_sink<'a>(&'a self, project: &'a str, name: &'a str) -> ClientFuture<'a, ()> {
        Box::pin(async move {
            self.delete_unit(&format!("{LOGGING}/projects/{project}/sinks/{name}"))
                .await
        })
    }
}
