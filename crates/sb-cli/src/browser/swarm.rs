//! Browser backed by a live swarm manager

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use sb_connect::{HostConnector, HostPool, SshConnector};
use sb_core::config::{ClusterProfile, ConfigFile};
use sb_core::error::SbError;
use sb_core::traits::SwarmApi;
use sb_core::types::{Service, Stack, Task};
use sb_core::{ContainerRef, STACK_NAMESPACE_LABEL};
use sb_session::{AttachRequest, Session, SessionBridge};

use super::{ensure_running, ClusterBrowser};

/// Queries the cluster's manager node and attaches through pooled tunnels
pub struct SwarmBrowser<C: HostConnector = SshConnector> {
    name: String,
    cluster: ClusterProfile,
    pool: HostPool<C>,
    bridge: SessionBridge,
}

impl SwarmBrowser<SshConnector> {
    /// Build a browser for the requested (or default) cluster
    pub fn from_config(config: &ConfigFile, cluster: Option<&str>) -> Result<Self, SbError> {
        let (name, profile) = config.select_cluster(cluster)?;
        let connector = SshConnector::new(config.tunnel.clone(), config.engine.clone());
        let bridge = SessionBridge::new(config.session.clone())?;
        Ok(Self::new(name, profile.clone(), HostPool::new(connector), bridge))
    }
}

impl<C> SwarmBrowser<C>
where
    C: HostConnector,
    C::Engine: SwarmApi,
{
    pub fn new(
        name: impl Into<String>,
        cluster: ClusterProfile,
        pool: HostPool<C>,
        bridge: SessionBridge,
    ) -> Self {
        Self {
            name: name.into(),
            cluster,
            pool,
            bridge,
        }
    }

    pub fn pool(&self) -> &HostPool<C> {
        &self.pool
    }

    async fn manager(&self) -> Result<Arc<C::Engine>, SbError> {
        let client = self.pool.client_for(&self.cluster.host).await?;
        Ok(client.engine().clone())
    }
}

#[async_trait]
impl<C> ClusterBrowser for SwarmBrowser<C>
where
    C: HostConnector,
    C::Engine: SwarmApi,
{
    type Engine = C::Engine;

    fn cluster_name(&self) -> &str {
        &self.name
    }

    async fn list_stacks(&self) -> Result<Vec<Stack>, SbError> {
        let services = self.manager().await?.list_services(None).await?;
        let names: BTreeSet<String> = services
            .into_iter()
            .filter_map(|s| s.labels.get(STACK_NAMESPACE_LABEL).cloned())
            .collect();
        Ok(names.into_iter().map(|name| Stack { name }).collect())
    }

    async fn list_services(&self, stack: &Stack) -> Result<Vec<Service>, SbError> {
        let summaries = self
            .manager()
            .await?
            .list_services(Some(&stack.name))
            .await?;
        let mut services: Vec<Service> = summaries
            .into_iter()
            .map(|s| Service {
                id: s.id,
                name: s.name,
                running_tasks: s.running_tasks,
                desired_tasks: s.desired_tasks,
                stack: stack.clone(),
            })
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    async fn list_tasks(&self, service: &Service) -> Result<Vec<Task>, SbError> {
        let manager = self.manager().await?;
        let summaries = manager.list_tasks(&service.id).await?;

        let mut hostnames: HashMap<String, String> = HashMap::new();
        let mut tasks = Vec::with_capacity(summaries.len());
        for summary in summaries {
            if summary.node_id.is_empty() {
                tracing::debug!("Task {} is not scheduled on a node yet", summary.id);
                continue;
            }
            let hostname = match hostnames.get(&summary.node_id) {
                Some(hostname) => hostname.clone(),
                None => {
                    let node = manager.inspect_node(&summary.node_id).await?;
                    hostnames.insert(summary.node_id.clone(), node.hostname.clone());
                    node.hostname
                }
            };
            let host = self.cluster.resolve_host(&hostname)?;
            tasks.push(Task {
                task_id: summary.id,
                container: ContainerRef::new(summary.container_id),
                host,
                node_hostname: hostname,
                state: summary.state,
            });
        }
        Ok(tasks)
    }

    async fn attach_to_task(
        &self,
        task: &Task,
        command: Vec<String>,
    ) -> Result<Session<C::Engine>, SbError> {
        ensure_running(task)?;
        tracing::info!(
            "Attaching to task {} ({}) on {}",
            task.task_id,
            task.container,
            task.host
        );
        self.bridge
            .attach_request(
                &self.pool,
                AttachRequest {
                    host: task.host.clone(),
                    container: task.container.clone(),
                    command,
                },
            )
            .await
    }

    async fn close(&self) -> Result<(), SbError> {
        self.pool.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_connect::{ClientHandle, TunnelLink, TunnelState};
    use sb_core::config::{NodeProfile, SessionConfig};
    use sb_core::error::{AttachError, ConfigError, ConnectionError, EngineError};
    use sb_core::traits::{ExecEngine, ExecSpec, ExecStream};
    use sb_core::types::{NodeSummary, ServiceSummary, TaskState, TaskSummary};
    use sb_core::{ContainerRef, ExecId, Host, TerminalSize};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    struct ManagerEngine {
        inspects: Arc<AtomicUsize>,
        creates: Arc<Mutex<Vec<ContainerRef>>>,
    }

    #[async_trait]
    impl ExecEngine for ManagerEngine {
        async fn create_exec(
            &self,
            container: &ContainerRef,
            _spec: &ExecSpec,
        ) -> Result<ExecId, EngineError> {
            self.creates.lock().unwrap().push(container.clone());
            Ok(ExecId("exec-1".into()))
        }

        async fn attach_exec(&self, _exec: &ExecId) -> Result<ExecStream, EngineError> {
            let (near, _far) = tokio::io::duplex(64);
            Ok(Box::new(near))
        }

        async fn resize_exec(&self, _exec: &ExecId, _size: TerminalSize) -> Result<(), EngineError> {
            Ok(())
        }
    }

    #[async_trait]
    impl SwarmApi for ManagerEngine {
        async fn list_services(
            &self,
            stack: Option<&str>,
        ) -> Result<Vec<ServiceSummary>, EngineError> {
            let all = vec![
                service("s2", "web_worker", "web", 1, 1),
                service("s1", "web_api", "web", 2, 3),
                service("s3", "db_postgres", "db", 1, 1),
                ServiceSummary {
                    id: "s4".into(),
                    name: "loose".into(),
                    ..Default::default()
                },
            ];
            Ok(all
                .into_iter()
                .filter(|s| match stack {
                    Some(stack) => s.labels.get(STACK_NAMESPACE_LABEL).map(String::as_str) == Some(stack),
                    None => true,
                })
                .collect())
        }

        async fn list_tasks(&self, service_id: &str) -> Result<Vec<TaskSummary>, EngineError> {
            assert_eq!(service_id, "s1");
            Ok(vec![
                TaskSummary {
                    id: "t1".into(),
                    node_id: "n2".into(),
                    container_id: "ac43c88fac17".into(),
                    state: TaskState::Running,
                },
                TaskSummary {
                    id: "t2".into(),
                    node_id: "n2".into(),
                    container_id: "bd54d99fbd28".into(),
                    state: TaskState::Running,
                },
                TaskSummary {
                    id: "t3".into(),
                    node_id: String::new(),
                    container_id: String::new(),
                    state: TaskState::Pending,
                },
            ])
        }

        async fn inspect_node(&self, node_id: &str) -> Result<NodeSummary, EngineError> {
            self.inspects.fetch_add(1, Ordering::SeqCst);
            let hostname = match node_id {
                "n2" => "worker-02",
                _ => "stranger",
            };
            Ok(NodeSummary {
                id: node_id.to_string(),
                hostname: hostname.to_string(),
            })
        }
    }

    fn service(id: &str, name: &str, stack: &str, running: u64, desired: u64) -> ServiceSummary {
        let mut labels = std::collections::HashMap::new();
        labels.insert(STACK_NAMESPACE_LABEL.to_string(), stack.to_string());
        ServiceSummary {
            id: id.into(),
            name: name.into(),
            labels,
            running_tasks: running,
            desired_tasks: desired,
        }
    }

    struct ReadyLink {
        host: Host,
        lost: CancellationToken,
    }

    #[async_trait]
    impl TunnelLink for ReadyLink {
        fn host(&self) -> &Host {
            &self.host
        }

        fn state(&self) -> TunnelState {
            TunnelState::Ready
        }

        fn lost(&self) -> CancellationToken {
            self.lost.clone()
        }

        async fn close(&self) -> Result<(), ConnectionError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Connector {
        connected: Mutex<Vec<Host>>,
        inspects: Arc<AtomicUsize>,
        creates: Arc<Mutex<Vec<ContainerRef>>>,
    }

    #[async_trait]
    impl HostConnector for Connector {
        type Engine = ManagerEngine;

        async fn connect(&self, host: &Host) -> Result<ClientHandle<ManagerEngine>, ConnectionError> {
            self.connected.lock().unwrap().push(host.clone());
            let engine = ManagerEngine {
                inspects: self.inspects.clone(),
                creates: self.creates.clone(),
            };
            let link = ReadyLink {
                host: host.clone(),
                lost: CancellationToken::new(),
            };
            Ok(ClientHandle::new(host.clone(), engine, Arc::new(link)))
        }
    }

    fn browser() -> SwarmBrowser<Connector> {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "worker-02".to_string(),
            NodeProfile {
                host: Host::new("worker-02.example.com"),
                hostname: "worker-02".to_string(),
            },
        );
        let cluster = ClusterProfile {
            name: "Production".into(),
            host: Host::new("manager-01.example.com"),
            nodes,
        };
        let bridge = SessionBridge::new(SessionConfig::default()).unwrap();
        SwarmBrowser::new("prod", cluster, HostPool::new(Connector::default()), bridge)
    }

    #[tokio::test]
    async fn test_stacks_are_sorted_and_deduplicated() {
        let browser = browser();
        let stacks = browser.list_stacks().await.unwrap();
        let names: Vec<&str> = stacks.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["db", "web"]);
        assert_eq!(
            browser.pool().connector().connected.lock().unwrap().clone(),
            vec![Host::new("manager-01.example.com")]
        );
    }

    #[tokio::test]
    async fn test_services_filtered_by_stack() {
        let browser = browser();
        let stack = Stack { name: "web".into() };
        let services = browser.list_services(&stack).await.unwrap();
        let names: Vec<&str> = services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["web_api", "web_worker"]);
        assert_eq!(services[0].running_tasks, 2);
        assert_eq!(services[0].desired_tasks, 3);
        assert_eq!(services[0].stack, stack);
    }

    fn api_service() -> Service {
        Service {
            id: "s1".into(),
            name: "web_api".into(),
            running_tasks: 2,
            desired_tasks: 3,
            stack: Stack { name: "web".into() },
        }
    }

    #[tokio::test]
    async fn test_tasks_resolve_nodes_to_hosts() {
        let browser = browser();
        let tasks = browser.list_tasks(&api_service()).await.unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].host, Host::new("worker-02.example.com"));
        assert_eq!(tasks[0].node_hostname, "worker-02");
        assert_eq!(tasks[0].container, ContainerRef::new("ac43c88fac17"));
        // Both tasks share a node, so it is inspected once
        assert_eq!(browser.pool().connector().inspects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attach_to_service_uses_first_running_task() {
        let browser = browser();
        let session = browser
            .attach_to_service(&api_service(), vec!["bash".into()])
            .await
            .unwrap();

        assert_eq!(session.host(), &Host::new("worker-02.example.com"));
        assert_eq!(session.container(), &ContainerRef::new("ac43c88fac17"));
        assert_eq!(session.command(), ["bash".to_string()]);
        let mut hosts = browser.pool().hosts();
        hosts.sort();
        assert_eq!(
            hosts,
            vec![
                Host::new("manager-01.example.com"),
                Host::new("worker-02.example.com")
            ]
        );
        browser.close().await.unwrap();
        assert!(browser.pool().is_closed());
    }

    #[tokio::test]
    async fn test_attach_to_pending_task_is_rejected() {
        let browser = browser();
        let task = Task {
            task_id: "t3".into(),
            container: ContainerRef::new(""),
            host: Host::new("worker-02.example.com"),
            node_hostname: "worker-02".into(),
            state: TaskState::Pending,
        };
        let err = browser.attach_to_task(&task, Vec::new()).await.unwrap_err();
        assert!(matches!(
            err,
            SbError::Attach(AttachError::TaskNotRunning { .. })
        ));
        assert!(browser.pool().connector().creates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_node_hostname_is_a_config_error() {
        let mut browser = browser();
        browser.cluster.nodes.clear();
        let err = browser.list_tasks(&api_service()).await.unwrap_err();
        assert!(matches!(
            err,
            SbError::Config(ConfigError::UnknownNode { ref hostname, .. }) if hostname == "worker-02"
        ));
    }
}
