// Stack assembly: run every declarator once and collect one template

use tracing::info;

use crate::config::StackDefinition;
use crate::constructs::{declare_image_ci, declare_mysql, ImageCiDeclaration, MysqlDeclaration};
use crate::context::Context;
use crate::template::{Declaration, Template, TemplateError};

/// Declarations produced for one stack, before rendering
#[derive(Debug, Clone)]
pub struct Stack {
    pub pipelines: Vec<ImageCiDeclaration>,
    pub database: Option<MysqlDeclaration>,
    pub description: Option<String>,
}

impl Stack {
    /// Run the declarators; the two kinds are independent of each other
    pub fn declare(definition: &StackDefinition, ctx: &Context) -> Self {
        let pipelines = definition
            .image_ci
            .iter()
            .map(|entry| declare_image_ci(ctx, &entry.id, &entry.props()))
            .collect();

        let database = definition
            .database
            .as_ref()
            .map(|entry| declare_mysql(ctx, &entry.id, &entry.props()));

        Self {
            pipelines,
            database,
            description: definition.description.clone(),
        }
    }

    /// Render all declarations and check the reference graph
    pub fn synthesize(&self) -> Result<Template, TemplateError> {
        let mut template = Template::new(self.description.clone());

        for pipeline in &self.pipelines {
            pipeline.render(&mut template)?;
        }
        if let Some(database) = &self.database {
            database.render(&mut template)?;
        }

        template.validate()?;
        info!(
            "Synthesized {} resources ({} pipelines, {} database)",
            template.resources.len(),
            self.pipelines.len(),
            if self.database.is_some() { 1 } else { 0 }
        );
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseEntry, ImageCiEntry};
    use crate::constructs::image_ci::{BuildEnvironment, ExecutionPolicy, GitSourceRef, RegistryRef};
    use crate::constructs::network::{NetworkPlacement, Subnet, SubnetKind};

    fn pipeline(id: &str, repository_name: &str) -> ImageCiEntry {
        ImageCiEntry {
            id: id.to_string(),
            git: GitSourceRef {
                owner: "acme".to_string(),
                repo: "app".to_string(),
                branch: "main".to_string(),
            },
            ecr: RegistryRef {
                repository_name: repository_name.to_string(),
                tag: None,
            },
            build_spec: None,
            environment: BuildEnvironment::default(),
            execution_policy: ExecutionPolicy::LeastPrivilege,
        }
    }

    fn database() -> DatabaseEntry {
        DatabaseEntry {
            id: "Mysql".to_string(),
            network: NetworkPlacement {
                vpc_id: "vpc-1".to_string(),
                subnets: vec![Subnet {
                    id: "subnet-a".to_string(),
                    availability_zone: "eu-west-1a".to_string(),
                    kind: SubnetKind::Isolated,
                }],
            },
            database_name: "orders".to_string(),
            master_username: "admin".to_string(),
        }
    }

    fn ctx() -> Context {
        Context::new("123456789012", "eu-west-1", "orders", "prod")
    }

    #[test]
    fn test_full_stack() {
        let definition = StackDefinition {
            version: Some(1),
            description: Some("orders".to_string()),
            image_ci: vec![pipeline("Api", "orders-api"), pipeline("Worker", "orders-worker")],
            database: Some(database()),
            ..Default::default()
        };

        let stack = Stack::declare(&definition, &ctx());
        let template = stack.synthesize().unwrap();

        assert_eq!(template.resources.len(), 3 * 2 + 6);
        assert_eq!(template.description.as_deref(), Some("orders"));

        let db = stack.database.unwrap();
        assert!(db.instance.multi_az);
        assert_eq!(db.instance.allocated_storage_gb, 100);
    }

    #[test]
    fn test_pipelines_only() {
        let definition = StackDefinition {
            image_ci: vec![pipeline("Api", "orders-api")],
            ..Default::default()
        };

        let template = Stack::declare(&definition, &ctx()).synthesize().unwrap();
        assert!(template
            .resources
            .values()
            .all(|r| !r.resource_type.starts_with("AWS::RDS")));
    }

    #[test]
    fn test_same_repository_twice_collides() {
        let definition = StackDefinition {
            image_ci: vec![pipeline("Api", "orders-api"), pipeline("Api2", "orders-api")],
            ..Default::default()
        };

        let err = Stack::declare(&definition, &ctx()).synthesize().unwrap_err();
        assert!(matches!(err, TemplateError::DuplicateLogicalId(_)));
    }

    #[test]
    fn test_database_does_not_depend_on_pipelines() {
        let with_pipeline = StackDefinition {
            image_ci: vec![pipeline("Api", "orders-api")],
            database: Some(database()),
            ..Default::default()
        };
        let without_pipeline = StackDefinition {
            database: Some(database()),
            ..Default::default()
        };

        let a = Stack::declare(&with_pipeline, &ctx()).database;
        let b = Stack::declare(&without_pipeline, &ctx()).database;
        assert_eq!(a, b);
    }
}
