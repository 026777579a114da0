// Managed MySQL instance sized by environment tier

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

use super::network::{NetworkPlacement, SubnetKind};
use super::tier::Tier;
use crate::context::Context;
use crate::template::intrinsic::{get_att, join, reference, tags};
use crate::template::{Declaration, DeletionPolicy, Resource, Template, TemplateError};

pub const ENGINE: &str = "mysql";
pub const ENGINE_VERSION: &str = "5.7.22";
pub const MAJOR_ENGINE_VERSION: &str = "5.7";
pub const PARAMETER_GROUP_FAMILY: &str = "mysql5.7";
pub const STORAGE_TYPE: &str = "gp2";
pub const MYSQL_PORT: u16 = 3306;

/// Characters the generated master password must not contain
const PASSWORD_EXCLUDED_CHARACTERS: &str = "\"@/\\";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MysqlProps {
    pub network: NetworkPlacement,
    pub database_name: String,
    pub master_username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionGroup {
    pub logical_id: String,
    pub engine_name: String,
    pub major_engine_version: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterGroup {
    pub logical_id: String,
    pub family: String,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetGroup {
    pub logical_id: String,
    pub kind: SubnetKind,
    pub subnet_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    pub logical_id: String,
    pub vpc_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterSecret {
    pub logical_id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInstance {
    pub logical_id: String,
    pub identifier: String,
    pub engine: String,
    pub engine_version: String,
    pub instance_class: String,
    pub allocated_storage_gb: u32,
    pub storage_type: String,
    pub multi_az: bool,
    pub deletion_protection: bool,
    pub auto_minor_version_upgrade: bool,
    pub allow_major_version_upgrade: bool,
    pub performance_insights: bool,
    pub database_name: String,
    pub master_username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysqlDeclaration {
    pub id: String,
    pub tier: Tier,
    pub option_group: OptionGroup,
    pub parameter_group: ParameterGroup,
    pub subnet_group: SubnetGroup,
    pub security_group: SecurityGroup,
    pub secret: MasterSecret,
    pub instance: DatabaseInstance,
    pub tags: BTreeMap<String, String>,
}

/// Declare a MySQL instance; every tier-dependent value comes from the tier table
pub fn declare_mysql(ctx: &Context, id: &str, props: &MysqlProps) -> MysqlDeclaration {
    let tier = ctx.tier();
    let profile = tier.profile();
    debug!(
        "Declaring MySQL {} as {} ({})",
        id, tier, profile.instance_class
    );

    let subnet_ids = props
        .network
        .select(&profile.subnets)
        .into_iter()
        .map(|subnet| subnet.id.clone())
        .collect();

    MysqlDeclaration {
        id: id.to_string(),
        tier,
        option_group: OptionGroup {
            logical_id: ctx.logical_id(&["MysqlOptionGroup"]),
            engine_name: ENGINE.to_string(),
            major_engine_version: MAJOR_ENGINE_VERSION.to_string(),
            options: Vec::new(),
        },
        parameter_group: ParameterGroup {
            logical_id: ctx.logical_id(&["MysqlParameterGroup"]),
            family: PARAMETER_GROUP_FAMILY.to_string(),
            parameters: BTreeMap::new(),
        },
        subnet_group: SubnetGroup {
            logical_id: ctx.logical_id(&[id, "SubnetGroup"]),
            kind: profile.subnets.kind,
            subnet_ids,
        },
        security_group: SecurityGroup {
            logical_id: ctx.logical_id(&[id, "SecurityGroup"]),
            vpc_id: props.network.vpc_id.clone(),
        },
        secret: MasterSecret {
            logical_id: ctx.logical_id(&[id, "Secret"]),
            username: props.master_username.clone(),
        },
        instance: DatabaseInstance {
            logical_id: ctx.logical_id(&["MysqlInstance"]),
            identifier: ctx.app_name.clone(),
            engine: ENGINE.to_string(),
            engine_version: ENGINE_VERSION.to_string(),
            instance_class: profile.instance_class.to_string(),
            allocated_storage_gb: profile.allocated_storage_gb,
            storage_type: STORAGE_TYPE.to_string(),
            multi_az: profile.multi_az,
            deletion_protection: true,
            auto_minor_version_upgrade: true,
            allow_major_version_upgrade: true,
            performance_insights: profile.performance_insights,
            database_name: props.database_name.clone(),
            master_username: props.master_username.clone(),
        },
        tags: ctx.tags(),
    }
}

impl MysqlDeclaration {
    /// `{{resolve:secretsmanager:<arn>:SecretString:<key>}}`
    fn secret_field(&self, key: &str) -> Value {
        join(vec![
            json!("{{resolve:secretsmanager:"),
            reference(&self.secret.logical_id),
            json!(format!(":SecretString:{}}}}}", key)),
        ])
    }

    fn instance_properties(&self) -> Value {
        let instance = &self.instance;
        json!({
            "DBInstanceIdentifier": instance.identifier,
            "Engine": instance.engine,
            "EngineVersion": instance.engine_version,
            "Port": MYSQL_PORT.to_string(),
            "DBInstanceClass": instance.instance_class,
            // CloudFormation models AllocatedStorage as a string
            "AllocatedStorage": instance.allocated_storage_gb.to_string(),
            "StorageType": instance.storage_type,
            "MultiAZ": instance.multi_az,
            "DeletionProtection": instance.deletion_protection,
            "AutoMinorVersionUpgrade": instance.auto_minor_version_upgrade,
            "AllowMajorVersionUpgrade": instance.allow_major_version_upgrade,
            "EnablePerformanceInsights": instance.performance_insights,
            "DBName": instance.database_name,
            "MasterUsername": self.secret_field("username"),
            "MasterUserPassword": self.secret_field("password"),
            "DBSubnetGroupName": reference(&self.subnet_group.logical_id),
            "DBParameterGroupName": reference(&self.parameter_group.logical_id),
            "OptionGroupName": reference(&self.option_group.logical_id),
            "VPCSecurityGroups": [get_att(&self.security_group.logical_id, "GroupId")],
            "PubliclyAccessible": false,
            "Tags": tags(&self.tags),
        })
    }
}

impl Declaration for MysqlDeclaration {
    fn render(&self, template: &mut Template) -> Result<(), TemplateError> {
        if self.subnet_group.subnet_ids.is_empty() {
            return Err(TemplateError::NoSubnets {
                construct: self.id.clone(),
                kind: self.subnet_group.kind.to_string(),
            });
        }

        template.add_resource(
            &self.option_group.logical_id,
            Resource::new(
                "AWS::RDS::OptionGroup",
                json!({
                    "EngineName": self.option_group.engine_name,
                    "MajorEngineVersion": self.option_group.major_engine_version,
                    "OptionGroupDescription": format!("Option group for {} {}", self.option_group.engine_name, self.option_group.major_engine_version),
                    "OptionConfigurations": self.option_group.options.iter().map(|name| json!({ "OptionName": name })).collect::<Vec<_>>(),
                    "Tags": tags(&self.tags),
                }),
            ),
        )?;
        template.add_resource(
            &self.parameter_group.logical_id,
            Resource::new(
                "AWS::RDS::DBParameterGroup",
                json!({
                    "Family": self.parameter_group.family,
                    "Description": format!("Parameter group for {}", self.parameter_group.family),
                    "Parameters": self.parameter_group.parameters,
                    "Tags": tags(&self.tags),
                }),
            ),
        )?;
        template.add_resource(
            &self.subnet_group.logical_id,
            Resource::new(
                "AWS::RDS::DBSubnetGroup",
                json!({
                    "DBSubnetGroupDescription": format!("Subnets for {} database", self.instance.identifier),
                    "SubnetIds": self.subnet_group.subnet_ids,
                    "Tags": tags(&self.tags),
                }),
            ),
        )?;
        template.add_resource(
            &self.security_group.logical_id,
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupDescription": format!("Security group for {} database", self.instance.identifier),
                    "VpcId": self.security_group.vpc_id,
                    "Tags": tags(&self.tags),
                }),
            ),
        )?;
        template.add_resource(
            &self.secret.logical_id,
            Resource::new(
                "AWS::SecretsManager::Secret",
                json!({
                    "Description": format!("Master credentials for {} database", self.instance.identifier),
                    "GenerateSecretString": {
                        "SecretStringTemplate": json!({ "username": self.secret.username }).to_string(),
                        "GenerateStringKey": "password",
                        "PasswordLength": 30,
                        "ExcludeCharacters": PASSWORD_EXCLUDED_CHARACTERS,
                    },
                    "Tags": tags(&self.tags),
                }),
            ),
        )?;
        template.add_resource(
            &self.instance.logical_id,
            Resource::new("AWS::RDS::DBInstance", self.instance_properties())
                .with_retention(DeletionPolicy::Snapshot),
        )?;

        template.add_output(
            format!("{}EndpointAddress", self.instance.logical_id),
            Some("Database endpoint host"),
            get_att(&self.instance.logical_id, "Endpoint.Address"),
        )?;
        template.add_output(
            format!("{}EndpointPort", self.instance.logical_id),
            Some("Database endpoint port"),
            get_att(&self.instance.logical_id, "Endpoint.Port"),
        )?;
        template.add_output(
            format!("{}SecretArn", self.instance.logical_id),
            Some("Secret holding the master credentials"),
            reference(&self.secret.logical_id),
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::network::Subnet;
    use super::*;

    fn ctx(env: &str) -> Context {
        Context::new("123456789012", "eu-west-1", "orders", env)
    }

    fn subnet(id: &str, az: &str) -> Subnet {
        Subnet {
            id: id.to_string(),
            availability_zone: az.to_string(),
            kind: SubnetKind::Isolated,
        }
    }

    fn props() -> MysqlProps {
        MysqlProps {
            network: NetworkPlacement {
                vpc_id: "vpc-1".to_string(),
                subnets: vec![
                    subnet("subnet-a1", "eu-west-1a"),
                    subnet("subnet-a2", "eu-west-1a"),
                    subnet("subnet-b1", "eu-west-1b"),
                ],
            },
            database_name: "orders".to_string(),
            master_username: "admin".to_string(),
        }
    }

    fn rendered(decl: &MysqlDeclaration) -> Template {
        let mut template = Template::default();
        decl.render(&mut template).unwrap();
        template.validate().unwrap();
        template
    }

    #[test]
    fn test_prod_scenario() {
        let decl = declare_mysql(&ctx("prod"), "Mysql", &props());
        let instance = &decl.instance;

        assert_eq!(decl.tier, Tier::Production);
        assert_eq!(instance.allocated_storage_gb, 100);
        assert!(instance.multi_az);
        assert_eq!(instance.instance_class, "db.r5.large");
        assert!(instance.performance_insights);
        assert!(instance.deletion_protection);
        assert_eq!(decl.subnet_group.subnet_ids, vec!["subnet-a1", "subnet-b1"]);
    }

    #[test]
    fn test_dev_scenario() {
        let decl = declare_mysql(&ctx("dev"), "Mysql", &props());
        let instance = &decl.instance;

        assert_eq!(decl.tier, Tier::NonProduction);
        assert_eq!(instance.allocated_storage_gb, 20);
        assert!(!instance.multi_az);
        assert_eq!(instance.instance_class, "db.t3.micro");
        assert!(!instance.performance_insights);
        assert!(instance.deletion_protection);
        assert_eq!(
            decl.subnet_group.subnet_ids,
            vec!["subnet-a1", "subnet-a2", "subnet-b1"]
        );
    }

    #[test]
    fn test_fixed_parameters_hold_for_every_tier() {
        for env in ["dev", "staging", "prod"] {
            let decl = declare_mysql(&ctx(env), "Mysql", &props());
            let instance = &decl.instance;

            assert!(instance.deletion_protection, "{}", env);
            assert!(instance.auto_minor_version_upgrade, "{}", env);
            assert!(instance.allow_major_version_upgrade, "{}", env);
            assert_eq!(instance.engine, "mysql");
            assert_eq!(instance.engine_version, "5.7.22");
            assert_eq!(instance.storage_type, "gp2");
            assert_eq!(instance.identifier, "orders");
            assert_eq!(instance.database_name, "orders");
            assert_eq!(instance.master_username, "admin");
            assert!(decl.parameter_group.parameters.is_empty());
            assert_eq!(decl.parameter_group.family, "mysql5.7");
            assert!(decl.option_group.options.is_empty());
            assert_eq!(decl.option_group.major_engine_version, "5.7");
            assert_eq!(decl.subnet_group.kind, SubnetKind::Isolated);
        }
    }

    #[test]
    fn test_rendered_instance() {
        let decl = declare_mysql(&ctx("prod"), "Mysql", &props());
        let template = rendered(&decl);
        let instance = &template.resources[&decl.instance.logical_id];

        assert_eq!(instance.resource_type, "AWS::RDS::DBInstance");
        assert_eq!(instance.deletion_policy, Some(DeletionPolicy::Snapshot));
        assert_eq!(instance.properties["AllocatedStorage"], "100");
        assert_eq!(instance.properties["MultiAZ"], true);
        assert_eq!(instance.properties["DeletionProtection"], true);
        assert_eq!(instance.properties["EnablePerformanceInsights"], true);
        assert_eq!(instance.properties["DBInstanceClass"], "db.r5.large");
        assert_eq!(
            instance.properties["DBSubnetGroupName"],
            reference(&decl.subnet_group.logical_id)
        );
        assert_eq!(template.resources.len(), 6);
        assert_eq!(template.outputs.len(), 3);
    }

    #[test]
    fn test_empty_groups_are_still_declared() {
        let decl = declare_mysql(&ctx("dev"), "Mysql", &props());
        let template = rendered(&decl);

        let params = &template.resources[&decl.parameter_group.logical_id];
        assert_eq!(params.properties["Parameters"], json!({}));
        let options = &template.resources[&decl.option_group.logical_id];
        assert_eq!(options.properties["OptionConfigurations"], json!([]));
    }

    #[test]
    fn test_master_password_comes_from_secret() {
        let decl = declare_mysql(&ctx("dev"), "Mysql", &props());
        let template = rendered(&decl);
        let instance = &template.resources[&decl.instance.logical_id];

        let password = &instance.properties["MasterUserPassword"]["Fn::Join"][1];
        assert_eq!(password[0], "{{resolve:secretsmanager:");
        assert_eq!(password[1], reference(&decl.secret.logical_id));
        assert_eq!(password[2], ":SecretString:password}}");

        let secret = &template.resources[&decl.secret.logical_id];
        assert_eq!(
            secret.properties["GenerateSecretString"]["SecretStringTemplate"],
            r#"{"username":"admin"}"#
        );
    }

    #[test]
    fn test_no_isolated_subnets_is_an_error() {
        let mut p = props();
        for subnet in &mut p.network.subnets {
            subnet.kind = SubnetKind::Private;
        }
        let decl = declare_mysql(&ctx("prod"), "Mysql", &p);

        let mut template = Template::default();
        let err = decl.render(&mut template).unwrap_err();
        assert!(matches!(err, TemplateError::NoSubnets { ref construct, .. } if construct == "Mysql"));
    }
}
