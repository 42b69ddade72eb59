//! Databases shipped with dbin

use crate::{CheckSpec, ClientSpec, DatabaseSpec, RetryPolicy, RoleSpec};

const POSTGRES_DATA: &str = "/var/lib/postgresql/data";

pub(crate) fn databases() -> Vec<DatabaseSpec> {
    vec![
        postgres_like("postgres", "PostgreSQL relational database", "postgres:latest"),
        postgres_like("pgvector", "PostgreSQL with the pgvector extension", "ankane/pgvector:latest"),
        postgres_like("postgis", "PostgreSQL with PostGIS spatial extensions", "postgis/postgis:latest"),
        postgres_like(
            "timescale",
            "TimescaleDB time-series database on PostgreSQL",
            "timescale/timescaledb:latest-pg15",
        ),
        mysql_like("mysql", "MySQL relational database", "mysql:latest", "mysql", "mysqladmin"),
        mysql_like("mariadb", "MariaDB relational database", "mariadb:latest", "mariadb", "mariadb-admin"),
        DatabaseSpec::new("mongo", "MongoDB document database", ClientSpec::exec(["mongosh"]))
            .role(RoleSpec::new("mongo", "mongo:latest").port(27017).volume("/data/db"))
            .readiness(
                CheckSpec::Exec {
                    command: strings(["mongosh", "--quiet", "--eval", "db.adminCommand('ping')"]),
                    role: None,
                },
                RetryPolicy::readiness_default(),
            ),
        DatabaseSpec::new("redis", "Redis in-memory key-value store", ClientSpec::exec(["redis-cli"]))
            .role(RoleSpec::new("redis", "redis:latest").port(6379).volume("/data"))
            .readiness(
                CheckSpec::Exec {
                    command: strings(["redis-cli", "ping"]),
                    role: None,
                },
                RetryPolicy::readiness_default(),
            ),
        DatabaseSpec::new(
            "valkey",
            "Valkey in-memory key-value store",
            ClientSpec::exec(["valkey-cli", "-n", "0"]),
        )
        .role(RoleSpec::new("valkey", "valkey/valkey:latest").port(6379).volume("/data"))
        .readiness(
            CheckSpec::Exec {
                command: strings(["valkey-cli", "ping"]),
                role: None,
            },
            RetryPolicy::readiness_default(),
        ),
        DatabaseSpec::new("cassandra", "Apache Cassandra wide-column store", ClientSpec::exec(["cqlsh"]))
            .role(RoleSpec::new("cassandra", "cassandra:latest").port(9042).volume("/var/lib/cassandra"))
            .readiness(
                CheckSpec::Exec {
                    command: strings(["nodetool", "status"]),
                    role: None,
                },
                RetryPolicy::new(30, 2),
            ),
        DatabaseSpec::new(
            "clickhouse",
            "ClickHouse column-oriented analytics database",
            ClientSpec::exec(["clickhouse-client", "--password", "clickhouse"]),
        )
        .role(
            RoleSpec::new("clickhouse", "clickhouse/clickhouse-server:latest")
                .port(9000)
                .env("CLICKHOUSE_DB", "default")
                .env("CLICKHOUSE_USER", "default")
                .env("CLICKHOUSE_DEFAULT_ACCESS_MANAGEMENT", "1")
                .env("CLICKHOUSE_PASSWORD", "clickhouse")
                .volume("/var/lib/clickhouse"),
        )
        .readiness(
            CheckSpec::Exec {
                command: strings(["clickhouse-client", "--password", "clickhouse", "--query", "SELECT 1"]),
                role: None,
            },
            RetryPolicy::readiness_default(),
        ),
        DatabaseSpec::new(
            "neo4j",
            "Neo4j graph database",
            ClientSpec::exec(["cypher-shell", "-u", "neo4j", "-p", "password"]),
        )
        .role(
            RoleSpec::new("neo4j", "neo4j:latest")
                .port(7687)
                .env("NEO4J_AUTH", "neo4j/password")
                .volume("/data"),
        )
        .readiness(
            CheckSpec::Exec {
                command: strings(["cypher-shell", "-u", "neo4j", "-p", "password", "RETURN 1"]),
                role: None,
            },
            RetryPolicy::new(30, 2),
        ),
        DatabaseSpec::new(
            "surrealdb",
            "SurrealDB multi-model database",
            ClientSpec::exec([
                "/surreal",
                "sql",
                "--endpoint",
                "http://127.0.0.1:8000",
                "--username",
                "root",
                "--password",
                "root",
            ]),
        )
        .role(
            RoleSpec::new("surrealdb", "surrealdb/surrealdb:latest")
                .port(8000)
                .env("SURREAL_USER", "root")
                .env("SURREAL_PASS", "root")
                .cmd(["start", "--user", "root", "--pass", "root"]),
        )
        .readiness(
            CheckSpec::Http {
                path: "/health".to_string(),
            },
            RetryPolicy::readiness_default(),
        ),
        DatabaseSpec::new(
            "yugabyte",
            "YugabyteDB distributed SQL database",
            ClientSpec::exec([
                "sh",
                "-c",
                "exec bin/ysqlsh -h $(hostname) -U yugabyte -d yugabyte",
            ]),
        )
        .role(
            RoleSpec::new("yugabyte", "yugabytedb/yugabyte:latest")
                .port(5433)
                .env("YSQL_USER", "yugabyte")
                .env("YSQL_PASSWORD", "yugabyte")
                .env("YSQL_DB", "yugabyte")
                .cmd(["bin/yugabyted", "start", "--background=false"])
                .volume("/home/yugabyte/yb_data"),
        )
        .readiness(
            CheckSpec::Exec {
                command: strings([
                    "sh",
                    "-c",
                    "bin/ysqlsh -h $(hostname) -U yugabyte -d yugabyte -c 'SELECT 1'",
                ]),
                role: None,
            },
            RetryPolicy::new(30, 2),
        ),
        web_single("arangodb", "ArangoDB multi-model database", "arangodb:latest", 8529, "/")
            .map_role(|r| {
                r.env("ARANGO_ROOT_PASSWORD", "root")
                    .env("ARANGO_NO_AUTH", "1")
                    .volume("/var/lib/arangodb3")
            }),
        web_single("couchdb", "Apache CouchDB document database", "couchdb:latest", 5984, "/_utils")
            .map_role(|r| {
                r.env("COUCHDB_USER", "admin")
                    .env("COUCHDB_PASSWORD", "password")
                    .volume("/opt/couchdb/data")
            }),
        web_single("influxdb", "InfluxDB time-series database", "influxdb:latest", 8086, "/")
            .map_role(|r| {
                r.env("DOCKER_INFLUXDB_INIT_MODE", "setup")
                    .env("DOCKER_INFLUXDB_INIT_USERNAME", "admin")
                    .env("DOCKER_INFLUXDB_INIT_PASSWORD", "password")
                    .env("DOCKER_INFLUXDB_INIT_ORG", "myorg")
                    .env("DOCKER_INFLUXDB_INIT_BUCKET", "mybucket")
                    .env("DOCKER_INFLUXDB_INIT_ADMIN_TOKEN", "my-super-secret-auth-token")
                    .volume("/var/lib/influxdb2")
            }),
        web_single("orientdb", "OrientDB multi-model database", "orientdb:latest", 2480, "/")
            .map_role(|r| r.env("ORIENTDB_ROOT_PASSWORD", "root").volume("/orientdb/databases")),
        web_single("rethinkdb", "RethinkDB realtime document database", "rethinkdb:latest", 8080, "/")
            .map_role(|r| r.volume("/data")),
        web_single("questdb", "QuestDB time-series database", "questdb/questdb:latest", 9000, "/")
            .map_role(|r| r.volume("/root/.questdb")),
        web_single("prometheus", "Prometheus monitoring time-series database", "prom/prometheus:latest", 9090, "/")
            .map_role(|r| r.volume("/prometheus")),
        dgraph(),
        tidb(),
        hbase(),
        elasticsearch(),
        opensearch(),
    ]
}

fn strings<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

trait MapRole {
    fn map_role(self, f: impl FnOnce(RoleSpec) -> RoleSpec) -> Self;
}

impl MapRole for DatabaseSpec {
    /// Adjust the last role added
    fn map_role(mut self, f: impl FnOnce(RoleSpec) -> RoleSpec) -> Self {
        if let Some(role) = self.roles.pop() {
            self.roles.push(f(role));
        }
        self
    }
}

fn postgres_like(name: &str, description: &str, image: &str) -> DatabaseSpec {
    DatabaseSpec::new(name, description, ClientSpec::exec(["psql", "-U", "postgres"]))
        .role(
            RoleSpec::new(name, image)
                .port(5432)
                .env("POSTGRES_PASSWORD", "postgres")
                .env("POSTGRES_USER", "postgres")
                .env("POSTGRES_DB", "postgres")
                .volume(POSTGRES_DATA),
        )
        .readiness(
            CheckSpec::Postgres {
                user: "postgres".to_string(),
                password: "postgres".to_string(),
                database: "postgres".to_string(),
            },
            RetryPolicy::readiness_default(),
        )
}

fn mysql_like(name: &str, description: &str, image: &str, client: &str, admin: &str) -> DatabaseSpec {
    DatabaseSpec::new(name, description, ClientSpec::exec([client, "-uroot", "-proot"]))
        .role(
            RoleSpec::new(name, image)
                .port(3306)
                .env("MYSQL_ROOT_PASSWORD", "root")
                .env("MYSQL_DATABASE", "test")
                .volume("/var/lib/mysql"),
        )
        .readiness(
            CheckSpec::Exec {
                command: strings([admin, "ping", "-h127.0.0.1", "-uroot", "-proot", "--silent"]),
                role: None,
            },
            RetryPolicy::readiness_default(),
        )
}

fn web_single(name: &str, description: &str, image: &str, port: u16, path: &str) -> DatabaseSpec {
    DatabaseSpec::new(name, description, ClientSpec::web(path))
        .role(RoleSpec::new(name, image).port(port))
}

fn dgraph() -> DatabaseSpec {
    DatabaseSpec::new(
        "dgraph",
        "Dgraph graph database (zero + alpha, Ratel UI)",
        ClientSpec::web("/").on_role("ratel"),
    )
    .role(
        RoleSpec::new("zero", "dgraph/dgraph:latest")
            .cmd(["dgraph", "zero", "--my=${role:zero}:5080"])
            .volume("/dgraph")
            .settle(5),
    )
    .role(
        RoleSpec::new("alpha", "dgraph/dgraph:latest")
            .port(8080)
            .cmd([
                "dgraph",
                "alpha",
                "--my=${role:alpha}:7080",
                "--zero=${role:zero}:5080",
                "--security",
                "whitelist=0.0.0.0/0",
            ])
            .volume("/dgraph"),
    )
    .role(RoleSpec::new("ratel", "dgraph/ratel:latest").port(8000))
    .primary("alpha")
    .readiness(
        CheckSpec::Http {
            path: "/health".to_string(),
        },
        RetryPolicy::new(30, 2),
    )
}

fn tidb() -> DatabaseSpec {
    DatabaseSpec::new(
        "tidb",
        "TiDB distributed database (pd + tikv + tidb)",
        ClientSpec::sidecar(
            "mysql:latest",
            ["mysql", "-h${role:tidb}", "-P4000", "-uroot", "--connect-timeout=10"],
        )
        .retry(RetryPolicy::new(30, 2)),
    )
    .role(
        RoleSpec::new("pd", "pingcap/pd:latest")
            .cmd([
                "--name=pd1",
                "--data-dir=/data/pd",
                "--client-urls=http://0.0.0.0:2379",
                "--advertise-client-urls=http://${role:pd}:2379",
                "--peer-urls=http://0.0.0.0:2380",
                "--advertise-peer-urls=http://${role:pd}:2380",
                "--initial-cluster=pd1=http://${role:pd}:2380",
            ])
            .volume("/data/pd")
            .settle(5),
    )
    .role(
        RoleSpec::new("tikv", "pingcap/tikv:latest")
            .cmd([
                "--pd=${role:pd}:2379",
                "--data-dir=/data/tikv",
                "--addr=0.0.0.0:20160",
                "--advertise-addr=${role:tikv}:20160",
            ])
            .volume("/data/tikv")
            .settle(5),
    )
    .role(
        RoleSpec::new("tidb", "pingcap/tidb:latest")
            .port(4000)
            .cmd(["--store=tikv", "--path=${role:pd}:2379"]),
    )
}

fn hbase() -> DatabaseSpec {
    DatabaseSpec::new(
        "hbase",
        "Apache HBase on ZooKeeper",
        ClientSpec::exec(["hbase", "shell"]),
    )
    .role(
        RoleSpec::new("zookeeper", "zookeeper:latest")
            .volume("/data")
            .settle(10),
    )
    .role(
        RoleSpec::new("hbase", "harisekhon/hbase:latest")
            .port(16010)
            .env("HBASE_CONF_hbase_zookeeper_quorum", "${role:zookeeper}")
            .volume("/data"),
    )
    .readiness(
        CheckSpec::Http {
            path: "/".to_string(),
        },
        RetryPolicy::new(30, 2),
    )
}

fn elasticsearch() -> DatabaseSpec {
    DatabaseSpec::new(
        "elasticsearch",
        "Elasticsearch with Kibana",
        ClientSpec::web("/")
            .on_role("kibana")
            .retry(RetryPolicy::new(12, 5)),
    )
    .role(
        RoleSpec::new("elasticsearch", "elasticsearch:8.12.0")
            .port(9200)
            .env("discovery.type", "single-node")
            .env("ES_JAVA_OPTS", "-Xms512m -Xmx512m")
            .env("xpack.security.enabled", "false")
            .env("bootstrap.memory_lock", "true")
            .volume("/usr/share/elasticsearch/data")
            .settle(15),
    )
    .role(
        RoleSpec::new("kibana", "kibana:8.12.0")
            .port(5601)
            .env("ELASTICSEARCH_HOSTS", "http://${role:elasticsearch}:9200"),
    )
    .primary("elasticsearch")
    .readiness(
        CheckSpec::Http {
            path: "/".to_string(),
        },
        RetryPolicy::new(30, 2),
    )
}

fn opensearch() -> DatabaseSpec {
    DatabaseSpec::new(
        "opensearch",
        "OpenSearch with OpenSearch Dashboards",
        ClientSpec::web("/")
            .on_role("dashboards")
            .retry(RetryPolicy::new(12, 5)),
    )
    .role(
        RoleSpec::new("opensearch", "opensearchproject/opensearch:latest")
            .port(9200)
            .env("discovery.type", "single-node")
            .env("OPENSEARCH_JAVA_OPTS", "-Xms512m -Xmx512m")
            .env("DISABLE_SECURITY_PLUGIN", "true")
            .env("DISABLE_INSTALL_DEMO_CONFIG", "true")
            .env("OPENSEARCH_INITIAL_ADMIN_PASSWORD", "admin")
            .volume("/usr/share/opensearch/data")
            .settle(10),
    )
    .role(
        RoleSpec::new("dashboards", "opensearchproject/opensearch-dashboards:latest")
            .port(5601)
            .env("OPENSEARCH_HOSTS", "[\"http://${role:opensearch}:9200\"]")
            .env("DISABLE_SECURITY_DASHBOARDS_PLUGIN", "true"),
    )
    .primary("opensearch")
    .readiness(
        CheckSpec::Http {
            path: "/".to_string(),
        },
        RetryPolicy::new(30, 2),
    )
}
