// CodeBuild buildspec with fixed pre_build/build/post_build phases

use serde::{Deserialize, Serialize};

/// Registry host as seen from inside the build container
pub const REGISTRY_HOST: &str = "$AWS_ACCOUNT_ID.dkr.ecr.$AWS_REGION.amazonaws.com";

fn default_version() -> String {
    "0.2".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    #[serde(default = "default_version")]
    pub version: String,
    pub phases: Phases,
}

/// Phases run in field order; serde keeps that order in the rendered YAML
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phases {
    #[serde(default)]
    pub pre_build: Phase,
    #[serde(default)]
    pub build: Phase,
    #[serde(default)]
    pub post_build: Phase,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    #[serde(default)]
    pub commands: Vec<String>,
}

impl Phase {
    fn new(commands: Vec<String>) -> Self {
        Self { commands }
    }
}

impl Default for BuildSpec {
    fn default() -> Self {
        Self::image_push()
    }
}

impl BuildSpec {
    /// Log in to ECR, build `$APP_NAME:$ENV` from `$DOCKERFILE`, tag it with
    /// the registry URI and push it
    pub fn image_push() -> Self {
        let remote = format!("{}/$APP_NAME:$ENV", REGISTRY_HOST);
        Self {
            version: default_version(),
            phases: Phases {
                pre_build: Phase::new(vec![format!(
                    "aws ecr get-login-password --region $AWS_REGION | docker login --username AWS --password-stdin {}",
                    REGISTRY_HOST
                )]),
                build: Phase::new(vec![
                    "docker build -t $APP_NAME:$ENV -f $DOCKERFILE .".to_string()
                ]),
                post_build: Phase::new(vec![
                    format!("docker tag $APP_NAME:$ENV {}", remote),
                    format!("docker push {}", remote),
                ]),
            },
        }
    }

    /// All commands as (phase, command), in execution order
    pub fn commands(&self) -> Vec<(&'static str, &str)> {
        [
            ("pre_build", &self.phases.pre_build),
            ("build", &self.phases.build),
            ("post_build", &self.phases.post_build),
        ]
        .into_iter()
        .flat_map(|(name, phase)| phase.commands.iter().map(move |c| (name, c.as_str())))
        .collect()
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
