//! Rendering of the broker's configuration files.
//!
//! Templates use a small placeholder language:
//!
//! - `{{ name }}` is replaced by the variable `name`. Referencing an undefined variable is an error.
//! - `{{#if name}} ... {{/if}}` keeps its body only if `name` is defined and not empty. Sections nest.
//!
//! A newline directly following a section tag is dropped, so section tags can sit on lines of their own without
//! leaving blank lines behind.

use std::{collections::BTreeMap, fmt, path::Path};

use thiserror::Error;
use tracing::debug;

use crate::{
    build_info,
    error::{Error, Result},
    resolver::ResolvedBrokerConfig,
    resource::ServiceState,
};

const DEFAULT_ENV_TEMPLATE: &str = include_str!("template/default-env.tmpl");
const SERVER_PROPERTIES_TEMPLATE: &str = include_str!("template/server.properties.tmpl");
const LOG4J_PROPERTIES_TEMPLATE: &str = include_str!("template/log4j.properties.tmpl");

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("malformed template {template} at byte {offset}: {reason}")]
    Malformed {
        template: String,
        offset: usize,
        reason: String,
    },

    #[error("template {template} references undefined variable \"{name}\"")]
    MissingVariable { template: String, name: String },

    #[error("value of {name} cannot be rendered: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl RenderError {
    fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// The files rendered for a broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum TemplateKind {
    /// Environment file sourced by the init script.
    DefaultEnv,
    ServerProperties,
    Log4jProperties,
}

impl TemplateKind {
    pub const ALL: [Self; 3] = [
        Self::DefaultEnv,
        Self::ServerProperties,
        Self::Log4jProperties,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::DefaultEnv => "default-env",
            Self::ServerProperties => "server.properties",
            Self::Log4jProperties => "log4j.properties",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Variables available to templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    vars: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables for the resolved configuration of one broker.
    ///
    /// Optional settings that are unset are left undefined, so templates can test them with `{{#if}}`.
    ///
    /// Values are written into line-based files without escaping, so a value containing a line break is rejected.
    /// So are metrics property keys and values containing `=` and a heap option string containing `"`.
    pub fn from_config(config: &ResolvedBrokerConfig) -> Result<Self, RenderError> {
        let s = &config.settings;
        let mut ctx = Self::new();

        ctx.insert("managed_by", build_info::managed_by());
        ctx.insert("host", &config.host);
        ctx.insert("broker_id", config.broker_id);
        ctx.insert("port", config.port);
        ctx.insert(
            "kafka_start",
            match config.service_state {
                ServiceState::Running => "yes",
                ServiceState::Stopped => "no",
            },
        );

        ctx.insert(
            "log_dirs",
            config
                .log_dirs()
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(","),
        );
        ctx.insert("zookeeper_connect", config.zookeeper_connect());
        ctx.insert("zookeeper_connection_timeout_ms", s.zookeeper_connection_timeout_ms);
        ctx.insert("zookeeper_session_timeout_ms", s.zookeeper_session_timeout_ms);

        ctx.insert("kafka_config_dir", s.kafka_config_dir.display());
        ctx.insert("kafka_log_file", s.kafka_log_file.display());
        ctx.insert("server_properties_path", config.server_properties_path().display());
        ctx.insert("log4j_properties_path", config.log4j_properties_path().display());
        ctx.insert("jmx_port", s.jmx_port);
        if let Some(heap_opts) = &s.heap_opts {
            if heap_opts.contains('"') {
                return Err(RenderError::invalid_value("heap_opts", "contains '\"'"));
            }
            ctx.insert("heap_opts", heap_opts);
        }
        ctx.insert("nofiles_ulimit", s.nofiles_ulimit);
        ctx.insert("user", &s.user);
        ctx.insert("group", &s.group);

        ctx.insert("num_network_threads", s.num_network_threads);
        ctx.insert("num_io_threads", s.num_io_threads);
        ctx.insert("num_partitions", s.num_partitions);
        ctx.insert("default_replication_factor", s.default_replication_factor);
        ctx.insert("num_replica_fetchers", s.num_replica_fetchers);
        ctx.insert("auto_create_topics_enable", s.auto_create_topics_enable);

        ctx.insert("socket_send_buffer_bytes", s.socket_send_buffer_bytes);
        ctx.insert("socket_receive_buffer_bytes", s.socket_receive_buffer_bytes);
        ctx.insert("socket_request_max_bytes", s.socket_request_max_bytes);

        ctx.insert("log_flush_interval_messages", s.log_flush_interval_messages);
        ctx.insert("log_flush_interval_ms", s.log_flush_interval_ms);
        ctx.insert("log_retention_hours", s.log_retention_hours);
        if let Some(bytes) = s.log_retention_bytes {
            ctx.insert("log_retention_bytes", bytes);
        }
        ctx.insert("log_segment_bytes", s.log_segment_bytes);
        ctx.insert("log_cleanup_interval_mins", s.log_cleanup_interval_mins);
        ctx.insert("log_cleanup_policy", s.log_cleanup_policy);

        if let Some((name, _)) = ctx.vars.iter().find(|(_, v)| has_line_break(v)) {
            return Err(RenderError::invalid_value(name.as_str(), "contains a line break"));
        }

        let mut metrics = String::new();
        for (k, v) in &s.metrics_properties {
            for (part, value) in [("key", k), ("value", v)] {
                if has_line_break(value) || value.contains('=') {
                    return Err(RenderError::invalid_value(
                        format!("metrics_properties {k:?}"),
                        format!("{part} contains a line break or '='"),
                    ));
                }
            }
            metrics.push_str(&format!("{k}={v}\n"));
        }
        ctx.insert("metrics_properties", metrics);

        Ok(ctx)
    }

    /// Defines or replaces a variable.
    pub fn insert(&mut self, name: impl Into<String>, value: impl fmt::Display) {
        self.vars.insert(name.into(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    fn is_truthy(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.is_empty())
    }
}

fn has_line_break(s: &str) -> bool {
    s.contains(['\n', '\r'])
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Var(String),
    If { name: String, body: Vec<Node> },
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Parse `source`. `name` only shows up in errors.
    pub fn parse(name: impl Into<String>, source: &str) -> Result<Self, RenderError> {
        let name = name.into();
        let malformed = |offset: usize, reason: String| RenderError::Malformed {
            template: name.clone(),
            offset,
            reason,
        };

        // open sections: variable name, offset of the opening tag, nodes of the enclosing scope
        let mut open: Vec<(String, usize, Vec<Node>)> = vec![];
        let mut nodes = vec![];
        let mut pos = 0;

        while let Some(start) = source[pos..].find("{{").map(|i| pos + i) {
            if start > pos {
                nodes.push(Node::Text(source[pos..start].to_owned()));
            }

            let inner = start + 2;
            let end = source[inner..]
                .find("}}")
                .map(|i| inner + i)
                .ok_or_else(|| malformed(start, "unterminated tag".to_owned()))?;
            let tag = source[inner..end].trim();
            pos = end + 2;

            match tag.split_once(char::is_whitespace) {
                Some(("#if", var)) => {
                    let var = var.trim();
                    if !is_valid_name(var) {
                        return Err(malformed(start, format!("invalid variable name `{var}`")));
                    }
                    open.push((var.to_owned(), start, std::mem::take(&mut nodes)));
                    pos = skip_newline(source, pos);
                }
                _ if tag == "/if" => {
                    let (var, _, enclosing) = open
                        .pop()
                        .ok_or_else(|| malformed(start, "`/if` without matching `#if`".to_owned()))?;
                    let body = std::mem::replace(&mut nodes, enclosing);
                    nodes.push(Node::If { name: var, body });
                    pos = skip_newline(source, pos);
                }
                _ if tag.starts_with('#') || tag.starts_with('/') => {
                    return Err(malformed(start, format!("unknown directive `{tag}`")));
                }
                _ => {
                    if !is_valid_name(tag) {
                        return Err(malformed(start, format!("invalid variable name `{tag}`")));
                    }
                    nodes.push(Node::Var(tag.to_owned()));
                }
            }
        }

        if pos < source.len() {
            nodes.push(Node::Text(source[pos..].to_owned()));
        }

        if let Some((var, offset, _)) = open.pop() {
            return Err(malformed(offset, format!("section `#if {var}` is never closed")));
        }

        Ok(Self { name, nodes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render with the given variables.
    pub fn render(&self, ctx: &TemplateContext) -> Result<String, RenderError> {
        let mut out = String::new();
        self.render_nodes(&self.nodes, ctx, &mut out)?;
        Ok(out)
    }

    fn render_nodes(
        &self,
        nodes: &[Node],
        ctx: &TemplateContext,
        out: &mut String,
    ) -> Result<(), RenderError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Var(var) => {
                    let value = ctx.get(var).ok_or_else(|| RenderError::MissingVariable {
                        template: self.name.clone(),
                        name: var.clone(),
                    })?;
                    out.push_str(value);
                }
                Node::If { name, body } => {
                    if ctx.is_truthy(name) {
                        self.render_nodes(body, ctx, out)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn skip_newline(source: &str, pos: usize) -> usize {
    let rest = &source[pos..];
    if rest.starts_with("\r\n") {
        pos + 2
    } else if rest.starts_with('\n') {
        pos + 1
    } else {
        pos
    }
}

/// Renders the contents of a broker's configuration files.
pub trait TemplateRenderer {
    fn render(&self, kind: TemplateKind, ctx: &TemplateContext) -> Result<String, RenderError>;
}

/// Template sources, one per [`TemplateKind`].
///
/// [`Default`] gives the built-in templates for a Kafka 0.8 broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Templates {
    default_env: String,
    server_properties: String,
    log4j_properties: String,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            default_env: DEFAULT_ENV_TEMPLATE.to_owned(),
            server_properties: SERVER_PROPERTIES_TEMPLATE.to_owned(),
            log4j_properties: LOG4J_PROPERTIES_TEMPLATE.to_owned(),
        }
    }
}

impl Templates {
    /// Replace the template for `kind`.
    pub fn with_template(mut self, kind: TemplateKind, source: impl Into<String>) -> Self {
        let source = source.into();
        match kind {
            TemplateKind::DefaultEnv => self.default_env = source,
            TemplateKind::ServerProperties => self.server_properties = source,
            TemplateKind::Log4jProperties => self.log4j_properties = source,
        }
        self
    }

    /// Replace the template for `kind` with the contents of a file.
    pub fn with_template_file(self, kind: TemplateKind, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        debug!(template = %kind, path = %path.display(), "loaded template");
        Ok(self.with_template(kind, source))
    }

    pub fn source(&self, kind: TemplateKind) -> &str {
        match kind {
            TemplateKind::DefaultEnv => &self.default_env,
            TemplateKind::ServerProperties => &self.server_properties,
            TemplateKind::Log4jProperties => &self.log4j_properties,
        }
    }
}

impl TemplateRenderer for Templates {
    fn render(&self, kind: TemplateKind, ctx: &TemplateContext) -> Result<String, RenderError> {
        let out = Template::parse(kind.name(), self.source(kind))?.render(ctx)?;
        debug!(template = %kind, bytes = out.len(), "rendered template");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    use super::*;
    use crate::{
        config::BrokerDefaults,
        registry::{BrokerRegistry, HostOverride},
        resolver::resolve,
    };

    fn ctx(vars: &[(&str, &str)]) -> TemplateContext {
        let mut ctx = TemplateContext::new();
        for (k, v) in vars {
            ctx.insert(*k, v);
        }
        ctx
    }

    fn render(source: &str, vars: &[(&str, &str)]) -> Result<String, RenderError> {
        Template::parse("test", source)?.render(&ctx(vars))
    }

    fn config(defaults: BrokerDefaults) -> ResolvedBrokerConfig {
        let registry: BrokerRegistry = [("kafka1", HostOverride::new(7).with_port(9093_u16))]
            .into_iter()
            .collect();
        resolve("kafka1", &registry, &defaults).unwrap()
    }

    #[test]
    fn test_substitution() {
        assert_eq!(render("a={{a}}, b={{ b }}", &[("a", "1"), ("b", "2")]).unwrap(), "a=1, b=2");
        assert_eq!(render("no tags", &[]).unwrap(), "no tags");
        assert_eq!(render("", &[]).unwrap(), "");
    }

    #[test]
    fn test_sections() {
        let source = "x\n{{#if a}}\na={{a}}\n{{#if b}}\nb={{b}}\n{{/if}}\n{{/if}}\ny\n";
        assert_eq!(render(source, &[]).unwrap(), "x\ny\n");
        assert_eq!(render(source, &[("a", "")]).unwrap(), "x\ny\n");
        assert_eq!(render(source, &[("a", "1")]).unwrap(), "x\na=1\ny\n");
        assert_eq!(
            render(source, &[("a", "1"), ("b", "2")]).unwrap(),
            "x\na=1\nb=2\ny\n"
        );
    }

    #[test]
    fn test_missing_variable() {
        let err = render("a={{ a }}", &[]).unwrap_err();
        assert_eq!(
            err,
            RenderError::MissingVariable {
                template: "test".to_owned(),
                name: "a".to_owned(),
            }
        );

        // only rendered sections need their variables
        render("{{#if a}}{{ b }}{{/if}}", &[]).unwrap();
    }

    #[test]
    fn test_malformed() {
        assert_matches!(
            render("a={{ a", &[]).unwrap_err(),
            RenderError::Malformed { offset: 2, .. }
        );
        assert_matches!(
            render("{{/if}}", &[]).unwrap_err(),
            RenderError::Malformed { offset: 0, .. }
        );
        assert_matches!(
            render("ab{{#if a}}", &[]).unwrap_err(),
            RenderError::Malformed { offset: 2, .. }
        );
        assert_matches!(
            render("{{#each a}}{{/each}}", &[]).unwrap_err(),
            RenderError::Malformed { .. }
        );
        assert_matches!(
            render("{{}}", &[]).unwrap_err(),
            RenderError::Malformed { .. }
        );
        assert_matches!(
            render("{{ a b }}", &[]).unwrap_err(),
            RenderError::Malformed { .. }
        );
    }

    #[test]
    fn test_builtin_templates_parse() {
        let templates = Templates::default();
        for kind in TemplateKind::ALL {
            Template::parse(kind.name(), templates.source(kind)).unwrap();
        }
    }

    #[test]
    fn test_server_properties() {
        let config = config(BrokerDefaults::default());
        let out = Templates::default()
            .render(TemplateKind::ServerProperties, &TemplateContext::from_config(&config).unwrap())
            .unwrap();

        assert!(out.starts_with("# This file is managed by kafka-broker-config."));
        for line in [
            "broker.id=7",
            "port=9093",
            "num.network.threads=2",
            "num.io.threads=2",
            "socket.send.buffer.bytes=1048576",
            "socket.receive.buffer.bytes=1048576",
            "socket.request.max.bytes=104857600",
            "log.dirs=/var/spool/kafka",
            "log.flush.interval.messages=10000",
            "log.flush.interval.ms=1000",
            "log.retention.hours=168",
            "log.segment.bytes=536870912",
            "log.cleanup.interval.mins=1",
            "log.cleanup.policy=delete",
            "zookeeper.connect=localhost:2181",
            "zookeeper.connection.timeout.ms=1000000",
        ] {
            assert!(out.lines().any(|l| l == line), "missing {line:?} in:\n{out}");
        }
        assert!(!out.contains("log.retention.bytes"));
        assert!(!out.contains("Metrics"));
        assert!(!out.contains("{{"));
    }

    #[test]
    fn test_server_properties_optional_settings() {
        let mut defaults = BrokerDefaults {
            log_dirs: vec!["/data/a".into(), "/data/b".into()],
            log_retention_bytes: Some(1 << 30),
            zookeeper_hosts: vec!["zk1:2181".to_owned(), "zk2:2181".to_owned()],
            zookeeper_chroot: Some("/kafka".to_owned()),
            ..Default::default()
        };
        defaults
            .metrics_properties
            .insert("kafka.metrics.polling.interval.secs".to_owned(), "5".to_owned());
        defaults.metrics_properties.insert(
            "kafka.metrics.reporters".to_owned(),
            "kafka.metrics.KafkaCSVMetricsReporter".to_owned(),
        );

        let out = Templates::default()
            .render(
                TemplateKind::ServerProperties,
                &TemplateContext::from_config(&config(defaults)).unwrap(),
            )
            .unwrap();

        assert!(out.contains("\nlog.dirs=/data/a,/data/b\n"));
        assert!(out.contains("\nlog.retention.bytes=1073741824\n"));
        assert!(out.contains("\nzookeeper.connect=zk1:2181,zk2:2181/kafka\n"));
        assert!(out.ends_with(
            "kafka.metrics.polling.interval.secs=5\nkafka.metrics.reporters=kafka.metrics.KafkaCSVMetricsReporter\n"
        ));
    }

    #[test]
    fn test_default_env() {
        let templates = Templates::default();
        let out = templates
            .render(
                TemplateKind::DefaultEnv,
                &TemplateContext::from_config(&config(BrokerDefaults::default())).unwrap(),
            )
            .unwrap();
        assert!(out.contains("\nKAFKA_START=yes\n"));
        assert!(out.contains("\nJMX_PORT=9999\n"));
        assert!(out.contains("\nKAFKA_CONFIG=/etc/kafka\n"));
        assert!(out.contains("-Dlog4j.configuration=file:/etc/kafka/log4j.properties"));
        assert!(!out.contains("KAFKA_HEAP_OPTS"));

        let defaults = BrokerDefaults {
            enabled: false,
            heap_opts: Some("-Xmx1G -Xms1G".to_owned()),
            ..Default::default()
        };
        let out = templates
            .render(
                TemplateKind::DefaultEnv,
                &TemplateContext::from_config(&config(defaults)).unwrap(),
            )
            .unwrap();
        assert!(out.contains("\nKAFKA_START=no\n"));
        assert!(out.contains("\nKAFKA_HEAP_OPTS=\"-Xmx1G -Xms1G\"\n"));
    }

    #[test]
    fn test_log4j_properties() {
        let defaults = BrokerDefaults {
            kafka_log_file: "/srv/log/kafka.log".into(),
            ..Default::default()
        };
        let out = Templates::default()
            .render(
                TemplateKind::Log4jProperties,
                &TemplateContext::from_config(&config(defaults)).unwrap(),
            )
            .unwrap();
        assert!(out.contains("\nlog4j.appender.kafkaAppender.File=/srv/log/kafka.log\n"));
    }

    #[test]
    fn test_values_cannot_inject_lines() {
        let mut defaults = BrokerDefaults::default();
        defaults.metrics_properties.insert(
            "kafka.metrics.reporters".to_owned(),
            "x\nbroker.id=99".to_owned(),
        );
        assert_matches!(
            TemplateContext::from_config(&config(defaults)).unwrap_err(),
            RenderError::InvalidValue { name, .. } if name.contains("kafka.metrics.reporters")
        );

        let mut defaults = BrokerDefaults::default();
        defaults
            .metrics_properties
            .insert("broker.id=99\nx".to_owned(), "1".to_owned());
        assert_matches!(
            TemplateContext::from_config(&config(defaults)).unwrap_err(),
            RenderError::InvalidValue { .. }
        );

        let defaults = BrokerDefaults {
            heap_opts: Some("-Xmx1G\" -Dfoo=\"bar".to_owned()),
            ..Default::default()
        };
        assert_matches!(
            TemplateContext::from_config(&config(defaults)).unwrap_err(),
            RenderError::InvalidValue { name, .. } if name == "heap_opts"
        );

        let defaults = BrokerDefaults {
            user: "kafka\r\nKAFKA_START=yes".to_owned(),
            ..Default::default()
        };
        assert_matches!(
            TemplateContext::from_config(&config(defaults)).unwrap_err(),
            RenderError::InvalidValue { name, .. } if name == "user"
        );
    }

    #[test]
    fn test_log_dirs_are_listed_once() {
        let defaults = BrokerDefaults {
            log_dirs: vec!["/a".into(), "/b".into(), "/a".into()],
            ..Default::default()
        };
        let ctx = TemplateContext::from_config(&config(defaults)).unwrap();
        assert_eq!(ctx.get("log_dirs"), Some("/a,/b"));
    }

    #[test]
    fn test_custom_template() {
        let templates =
            Templates::default().with_template(TemplateKind::Log4jProperties, "file={{ kafka_log_file }}\n");
        let ctx = TemplateContext::from_config(&config(BrokerDefaults::default())).unwrap();
        assert_eq!(
            templates.render(TemplateKind::Log4jProperties, &ctx).unwrap(),
            "file=/var/log/kafka/kafka.log\n"
        );

        let templates = templates.with_template(TemplateKind::DefaultEnv, "{{ nope }}");
        assert_matches!(
            templates.render(TemplateKind::DefaultEnv, &ctx).unwrap_err(),
            RenderError::MissingVariable { template, name } if template == "default-env" && name == "nope"
        );
    }

    proptest! {
        #[test]
        fn test_plain_text_is_verbatim(s in "[^{]*") {
            prop_assert_eq!(render(&s, &[]).unwrap(), s);
        }

        #[test]
        fn test_parse_never_panics(s in "\\PC*") {
            if let Ok(template) = Template::parse("fuzz", &s) {
                let _ = template.render(&TemplateContext::new());
            }
        }

        #[test]
        fn test_render_is_deterministic(kind: TemplateKind, id in any::<i32>(), port in 1_u16..=u16::MAX) {
            let registry: BrokerRegistry = [("h", HostOverride::new(id).with_port(port))]
                .into_iter()
                .collect();
            let config = resolve("h", &registry, &BrokerDefaults::default()).unwrap();
            let ctx = TemplateContext::from_config(&config).unwrap();
            let templates = Templates::default();
            prop_assert_eq!(
                templates.render(kind, &ctx).unwrap(),
                templates.render(kind, &ctx).unwrap()
            );
        }
    }
}
