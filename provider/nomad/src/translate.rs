//! Deterministic translation of a gateway deployment request into a Nomad
//! job.

use crate::{
    job::{
        ConfigValue, Constraint, EphemeralDisk, Job, NetworkResource, Port, Resources,
        RestartPolicy, Service, Task, TaskGroup, Template, UpdateStrategy, VaultStanza,
    },
    JOB_PREFIX,
};
use base64::Engine as _;
use faas_provider_core::FunctionDeployment;
use std::collections::BTreeMap;

const NANOS_PER_SEC: u64 = 1_000_000_000;

const RESTART_ATTEMPTS: i64 = 25;
const EPHEMERAL_DISK_MB: i64 = 20;
const DEFAULT_MILLI_CPU: i64 = 100;
const DEFAULT_MEMORY_MB: i64 = 128;
const HTTP_PORT_LABEL: &str = "http";
const CONTAINER_PORT: i64 = 8080;
const CPU_ARCH_ATTRIBUTE: &str = "${attr.cpu.arch}";

#[derive(Clone, Debug)]
pub struct TranslateConfig {
    /// Region the job is submitted into.
    pub region: String,
    /// Datacenter used when no `datacenter ==` constraint is supplied.
    pub datacenter: String,
    /// CPU architecture injected when the request carries no arch constraint.
    pub cpu_arch: String,
    /// DNS server handed to tasks when discovery DNS is enabled.
    pub consul_dns_host: Option<String>,
    /// Policy attached to tasks that mount secrets.
    pub vault_default_policy: String,
    /// Path prefix for secret templates.
    pub vault_secret_path_prefix: String,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            region: "global".to_string(),
            datacenter: "dc1".to_string(),
            cpu_arch: "amd64".to_string(),
            consul_dns_host: None,
            vault_default_policy: "openfaas".to_string(),
            vault_secret_path_prefix: "secret/openfaas".to_string(),
        }
    }
}

/// Builds the job for a deployment request. The mapping is pure: the same
/// request and config always produce the same job.
pub fn job_from_deployment(request: &FunctionDeployment, config: &TranslateConfig) -> Job {
    let (datacenters, constraints) = parse_constraints(request.constraints.as_deref(), config);
    let name = format!("{}{}", JOB_PREFIX, request.service);

    Job {
        id: name.clone(),
        name,
        region: config.region.clone(),
        job_type: "service".to_string(),
        priority: 1,
        datacenters,
        constraints,
        task_groups: vec![TaskGroup {
            name: request.service.clone(),
            count: 1,
            tasks: vec![build_task(request, config)],
            restart_policy: Some(RestartPolicy {
                attempts: RESTART_ATTEMPTS,
                delay: NANOS_PER_SEC,
                mode: "delay".to_string(),
            }),
            ephemeral_disk: Some(EphemeralDisk {
                size_mb: EPHEMERAL_DISK_MB,
            }),
        }],
        meta: request.annotations.clone().unwrap_or_default(),
        update: Some(UpdateStrategy {
            stagger: 5 * NANOS_PER_SEC,
            min_healthy_time: 5 * NANOS_PER_SEC,
            healthy_deadline: 20 * NANOS_PER_SEC,
            auto_revert: true,
        }),
        status: None,
    }
}

/// Splits raw `attribute operator value` constraints into the datacenter
/// list and orchestrator constraints, injecting the default architecture
/// when the request does not pin one.
fn parse_constraints(
    raw: Option<&[String]>,
    config: &TranslateConfig,
) -> (Vec<String>, Vec<Constraint>) {
    let mut datacenters = Vec::new();
    let mut constraints = Vec::new();
    let mut has_arch = false;

    for entry in raw.unwrap_or_default() {
        let mut parts = entry.split_whitespace();
        let (Some(attribute), Some(operator)) = (parts.next(), parts.next()) else {
            continue;
        };
        let value = parts.collect::<Vec<_>>().join(" ");
        if value.is_empty() {
            continue;
        }

        if attribute == "datacenter" && operator == "==" {
            datacenters.push(value);
            continue;
        }

        let l_target = if attribute.starts_with("${") {
            attribute.to_string()
        } else {
            format!("${{{attribute}}}")
        };
        has_arch = has_arch || l_target == CPU_ARCH_ATTRIBUTE;
        constraints.push(Constraint {
            l_target,
            operand: if operator == "==" {
                "=".to_string()
            } else {
                operator.to_string()
            },
            r_target: value,
        });
    }

    if !has_arch {
        constraints.push(Constraint {
            l_target: CPU_ARCH_ATTRIBUTE.to_string(),
            operand: "=".to_string(),
            r_target: config.cpu_arch.clone(),
        });
    }
    if datacenters.is_empty() {
        datacenters.push(config.datacenter.clone());
    }
    (datacenters, constraints)
}

fn build_task(request: &FunctionDeployment, config: &TranslateConfig) -> Task {
    let mut docker = BTreeMap::new();
    docker.insert("image".to_string(), ConfigValue::from(request.image.clone()));
    docker.insert(
        "port_map".to_string(),
        ConfigValue::List(vec![ConfigValue::Map(
            Some((HTTP_PORT_LABEL.to_string(), ConfigValue::from(CONTAINER_PORT)))
                .into_iter()
                .collect(),
        )]),
    );
    docker.insert(
        "dns_servers".to_string(),
        ConfigValue::List(dns_servers(request, config)),
    );

    // Caller-supplied labels keep their list-of-singleton-maps shape.
    if let Some(labels) = &request.labels {
        docker.insert(
            "labels".to_string(),
            ConfigValue::List(
                labels
                    .iter()
                    .map(|(k, v)| {
                        ConfigValue::Map(
                            Some((k.clone(), ConfigValue::from(v.clone())))
                                .into_iter()
                                .collect(),
                        )
                    })
                    .collect(),
            ),
        );
    }

    if let Some(auth) = request.registry_auth.as_deref().and_then(docker_auth) {
        docker.insert("auth".to_string(), auth);
    }

    let secrets = request.secrets.as_deref().unwrap_or_default();
    let mut templates = Vec::with_capacity(secrets.len());
    let mut volumes = Vec::with_capacity(secrets.len());
    for secret in secrets {
        templates.push(Template {
            embedded_tmpl: format!(
                "{{{{with secret \"{}/{}\"}}}}{{{{.Data.value}}}}{{{{end}}}}",
                config.vault_secret_path_prefix, secret
            ),
            dest_path: format!("secrets/{secret}"),
        });
        volumes.push(ConfigValue::from(format!(
            "secrets/{secret}:/var/openfaas/secrets/{secret}"
        )));
    }
    if !volumes.is_empty() {
        docker.insert("volumes".to_string(), ConfigValue::List(volumes));
    }

    let mut env = request.env_vars.clone().unwrap_or_default();
    if let Some(process) = &request.env_process {
        if !process.is_empty() {
            env.insert("fprocess".to_string(), process.clone());
        }
    }

    let limits = request.limits.as_ref();
    Task {
        name: request.service.clone(),
        driver: "docker".to_string(),
        config: docker,
        env,
        resources: Some(Resources {
            cpu: parse_limit(limits.and_then(|l| l.cpu.as_deref()), DEFAULT_MILLI_CPU),
            memory_mb: parse_limit(limits.and_then(|l| l.memory.as_deref()), DEFAULT_MEMORY_MB),
            networks: vec![NetworkResource {
                m_bits: 1,
                dynamic_ports: vec![Port {
                    label: HTTP_PORT_LABEL.to_string(),
                    value: 0,
                }],
            }],
        }),
        services: vec![Service {
            name: request.service.clone(),
            port_label: HTTP_PORT_LABEL.to_string(),
        }],
        templates,
        vault: if secrets.is_empty() {
            None
        } else {
            Some(VaultStanza {
                policies: vec![config.vault_default_policy.clone()],
            })
        },
    }
}

fn dns_servers(request: &FunctionDeployment, config: &TranslateConfig) -> Vec<ConfigValue> {
    if let Some(servers) = request.env_vars.as_ref().and_then(|e| e.get("dns_servers")) {
        return servers
            .split(',')
            .map(|s| ConfigValue::from(s.trim()))
            .collect();
    }
    if let Some(host) = &config.consul_dns_host {
        return vec![ConfigValue::from(host.clone())];
    }
    vec![ConfigValue::from("8.8.8.8"), ConfigValue::from("8.8.4.4")]
}

/// Decodes base64 `user:pass` registry credentials into a docker auth
/// stanza. Malformed credentials are dropped rather than failing the
/// deployment.
fn docker_auth(registry_auth: &str) -> Option<ConfigValue> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(registry_auth)
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    let mut auth = BTreeMap::new();
    auth.insert("username".to_string(), ConfigValue::from(user));
    auth.insert("password".to_string(), ConfigValue::from(pass));
    Some(ConfigValue::List(vec![ConfigValue::Map(auth)]))
}

fn parse_limit(value: Option<&str>, default: i64) -> i64 {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    fn deployment() -> FunctionDeployment {
        FunctionDeployment {
            service: "hello".to_string(),
            image: "img:1".to_string(),
            ..FunctionDeployment::default()
        }
    }

    #[test]
    fn basic_deployment_produces_a_prefixed_service_job() {
        let job = job_from_deployment(&deployment(), &TranslateConfig::default());

        assert_eq!(job.id, "OpenFaaS-hello");
        assert_eq!(job.name, "OpenFaaS-hello");
        assert_eq!(job.job_type, "service");
        assert_eq!(job.priority, 1);
        assert_eq!(job.region, "global");
        assert_eq!(job.datacenters, vec!["dc1".to_string()]);

        let group = &job.task_groups[0];
        assert_eq!(group.name, "hello");
        assert_eq!(group.count, 1);
        assert_eq!(
            group.restart_policy,
            Some(RestartPolicy {
                attempts: 25,
                delay: NANOS_PER_SEC,
                mode: "delay".to_string(),
            })
        );
        assert_eq!(group.ephemeral_disk, Some(EphemeralDisk { size_mb: 20 }));

        let task = &group.tasks[0];
        assert_eq!(task.driver, "docker");
        assert_eq!(task.config["image"].as_str(), Some("img:1"));

        assert_eq!(
            job.update,
            Some(UpdateStrategy {
                stagger: 5 * NANOS_PER_SEC,
                min_healthy_time: 5 * NANOS_PER_SEC,
                healthy_deadline: 20 * NANOS_PER_SEC,
                auto_revert: true,
            })
        );
    }

    #[test]
    fn datacenter_constraints_become_the_job_datacenters() {
        let mut request = deployment();
        request.constraints = Some(vec!["datacenter == dc2".to_string()]);

        let job = job_from_deployment(&request, &TranslateConfig::default());
        assert_eq!(job.datacenters, vec!["dc2".to_string()]);
        // Only the injected architecture constraint remains.
        assert_eq!(
            job.constraints,
            vec![Constraint {
                l_target: "${attr.cpu.arch}".to_string(),
                operand: "=".to_string(),
                r_target: "amd64".to_string(),
            }]
        );
    }

    #[test]
    fn constraints_are_wrapped_and_operators_translated() {
        let mut request = deployment();
        request.constraints = Some(vec![
            "node.class == hi-mem".to_string(),
            "${meta.rack} != r1".to_string(),
        ]);

        let job = job_from_deployment(&request, &TranslateConfig::default());
        assert_eq!(
            job.constraints[0],
            Constraint {
                l_target: "${node.class}".to_string(),
                operand: "=".to_string(),
                r_target: "hi-mem".to_string(),
            }
        );
        assert_eq!(
            job.constraints[1],
            Constraint {
                l_target: "${meta.rack}".to_string(),
                operand: "!=".to_string(),
                r_target: "r1".to_string(),
            }
        );
        assert_eq!(job.constraints.len(), 3, "architecture default appended");
    }

    #[test]
    fn an_explicit_architecture_constraint_is_not_duplicated() {
        let mut request = deployment();
        request.constraints = Some(vec!["attr.cpu.arch == arm64".to_string()]);

        let job = job_from_deployment(&request, &TranslateConfig::default());
        assert_eq!(
            job.constraints,
            vec![Constraint {
                l_target: "${attr.cpu.arch}".to_string(),
                operand: "=".to_string(),
                r_target: "arm64".to_string(),
            }]
        );
    }

    #[test]
    fn environment_merges_fprocess_with_env_vars() {
        let mut request = deployment();
        request.env_vars = Some(btreemap! {
            "db".to_string() => "postgres://db".to_string(),
        });
        request.env_process = Some("./handler".to_string());

        let job = job_from_deployment(&request, &TranslateConfig::default());
        assert_eq!(
            job.task_groups[0].tasks[0].env,
            btreemap! {
                "db".to_string() => "postgres://db".to_string(),
                "fprocess".to_string() => "./handler".to_string(),
            }
        );
    }

    #[test]
    fn resource_limits_parse_with_defaults() {
        let config = TranslateConfig::default();

        let job = job_from_deployment(&deployment(), &config);
        let resources = job.task_groups[0].tasks[0].resources.clone().unwrap();
        assert_eq!(resources.cpu, 100);
        assert_eq!(resources.memory_mb, 128);

        let mut request = deployment();
        request.limits = Some(faas_provider_core::FunctionResources {
            memory: Some("256".to_string()),
            cpu: Some("200".to_string()),
        });
        let job = job_from_deployment(&request, &config);
        let resources = job.task_groups[0].tasks[0].resources.clone().unwrap();
        assert_eq!(resources.cpu, 200);
        assert_eq!(resources.memory_mb, 256);

        let mut request = deployment();
        request.limits = Some(faas_provider_core::FunctionResources {
            memory: Some("lots".to_string()),
            cpu: Some("".to_string()),
        });
        let job = job_from_deployment(&request, &config);
        let resources = job.task_groups[0].tasks[0].resources.clone().unwrap();
        assert_eq!(resources.cpu, 100, "unparsable limits fall back silently");
        assert_eq!(resources.memory_mb, 128);
    }

    #[test]
    fn dns_servers_prefer_env_then_discovery_then_public() {
        let mut config = TranslateConfig::default();

        let mut request = deployment();
        request.env_vars = Some(btreemap! {
            "dns_servers".to_string() => "1.1.1.1, 2.2.2.2".to_string(),
        });
        let job = job_from_deployment(&request, &config);
        assert_eq!(
            job.task_groups[0].tasks[0].config["dns_servers"],
            ConfigValue::List(vec![ConfigValue::from("1.1.1.1"), ConfigValue::from("2.2.2.2")])
        );

        config.consul_dns_host = Some("consul.service.dc1".to_string());
        let job = job_from_deployment(&deployment(), &config);
        assert_eq!(
            job.task_groups[0].tasks[0].config["dns_servers"],
            ConfigValue::List(vec![ConfigValue::from("consul.service.dc1")])
        );

        config.consul_dns_host = None;
        let job = job_from_deployment(&deployment(), &config);
        assert_eq!(
            job.task_groups[0].tasks[0].config["dns_servers"],
            ConfigValue::List(vec![ConfigValue::from("8.8.8.8"), ConfigValue::from("8.8.4.4")])
        );
    }

    #[test]
    fn secrets_produce_templates_mounts_and_a_vault_policy() {
        let mut request = deployment();
        request.secrets = Some(vec!["apikey".to_string()]);

        let job = job_from_deployment(&request, &TranslateConfig::default());
        let task = &job.task_groups[0].tasks[0];

        assert_eq!(
            task.templates,
            vec![Template {
                embedded_tmpl: "{{with secret \"secret/openfaas/apikey\"}}{{.Data.value}}{{end}}"
                    .to_string(),
                dest_path: "secrets/apikey".to_string(),
            }]
        );
        assert_eq!(
            task.config["volumes"],
            ConfigValue::List(vec![ConfigValue::from(
                "secrets/apikey:/var/openfaas/secrets/apikey"
            )])
        );
        assert_eq!(
            task.vault,
            Some(VaultStanza {
                policies: vec!["openfaas".to_string()],
            })
        );
    }

    #[test]
    fn registry_credentials_decode_into_docker_auth() {
        let mut request = deployment();
        // base64("user:pass")
        request.registry_auth = Some("dXNlcjpwYXNz".to_string());

        let job = job_from_deployment(&request, &TranslateConfig::default());
        let auth = job.task_groups[0].tasks[0].config["auth"].as_list().unwrap();
        let auth = auth[0].as_map().unwrap();
        assert_eq!(auth["username"].as_str(), Some("user"));
        assert_eq!(auth["password"].as_str(), Some("pass"));
    }

    #[test]
    fn malformed_registry_credentials_are_dropped() {
        let mut request = deployment();
        request.registry_auth = Some("%%%not-base64%%%".to_string());

        let job = job_from_deployment(&request, &TranslateConfig::default());
        assert!(!job.task_groups[0].tasks[0].config.contains_key("auth"));
    }

    #[test]
    fn labels_keep_their_singleton_map_shape() {
        let mut request = deployment();
        request.labels = Some(btreemap! {
            "tier".to_string() => "backend".to_string(),
        });

        let job = job_from_deployment(&request, &TranslateConfig::default());
        let labels = job.task_groups[0].tasks[0].config["labels"].as_list().unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].as_map().unwrap()["tier"].as_str(), Some("backend"));
    }

    #[test]
    fn annotations_are_copied_into_job_meta() {
        let mut request = deployment();
        request.annotations = Some(btreemap! {
            "owner".to_string() => "platform".to_string(),
        });

        let job = job_from_deployment(&request, &TranslateConfig::default());
        assert_eq!(job.meta["owner"], "platform");
    }

    #[test]
    fn the_task_registers_a_discovery_service_on_the_http_port() {
        let job = job_from_deployment(&deployment(), &TranslateConfig::default());
        assert_eq!(
            job.task_groups[0].tasks[0].services,
            vec![Service {
                name: "hello".to_string(),
                port_label: "http".to_string(),
            }]
        );
        let ports = &job.task_groups[0].tasks[0]
            .resources
            .as_ref()
            .unwrap()
            .networks[0]
            .dynamic_ports;
        assert_eq!(ports[0].label, "http");
        assert_eq!(
            job.task_groups[0].tasks[0].config["port_map"]
                .as_list()
                .unwrap()[0]
                .as_map()
                .unwrap()["http"]
                .as_int(),
            Some(8080)
        );
    }
}
