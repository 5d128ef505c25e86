//! Per-service invocation builder.

use crate::error::{ConfigError, Result};

use super::directive::{Directive, quote};

/// Accumulates directives for one service.
///
/// Flags, the image and the container command are collected separately so
/// that [`InvocationBuilder::finalize`] can place the image and command after
/// every flag regardless of the order parameters were declared in.
#[derive(Debug, Clone, Default)]
pub struct InvocationBuilder {
    directives: Vec<Directive>,
    image: Option<String>,
    command: Vec<String>,
}

impl InvocationBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a directive.
    pub fn push(&mut self, directive: Directive) {
        self.directives.push(directive);
    }

    /// Sets the container image.
    pub fn set_image(&mut self, image: impl Into<String>) {
        self.image = Some(image.into());
    }

    /// Appends container command arguments.
    pub fn extend_command(&mut self, args: impl IntoIterator<Item = String>) {
        self.command.extend(args);
    }

    /// Consumes the builder into a finished invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if no image was set.
    pub fn finalize(self, service: &str) -> Result<Invocation> {
        let image = self.image.ok_or_else(|| ConfigError::MissingImage {
            service: service.to_string(),
        })?;
        Ok(Invocation {
            service: service.to_string(),
            directives: self.directives,
            image,
            command: self.command,
        })
    }
}

/// A fully translated service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Service name, unprefixed.
    pub service: String,
    /// Directives in declaration order.
    pub directives: Vec<Directive>,
    /// Container image.
    pub image: String,
    /// Container command arguments.
    pub command: Vec<String>,
}

impl Invocation {
    /// Renders shell-quoted CLI arguments: flags, then image, then command.
    ///
    /// Directives without a swarm CLI flag are left out.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be quoted.
    pub fn cli_arguments(&self) -> Result<Vec<String>> {
        let mut args = Vec::with_capacity(self.directives.len() + self.command.len() + 1);
        for directive in &self.directives {
            if let Some(flag) = directive.to_cli()? {
                args.push(flag);
            }
        }
        args.push(quote(&self.image)?);
        for arg in &self.command {
            args.push(quote(arg)?);
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ComposeError;

    #[test]
    fn test_finalize_requires_image() {
        let mut builder = InvocationBuilder::new();
        builder.push(Directive::Replicas(String::from("2")));
        let result = builder.finalize("web");
        assert!(matches!(
            result,
            Err(ComposeError::Config(ConfigError::MissingImage { ref service })) if service == "web"
        ));
    }

    #[test]
    fn test_image_and_command_follow_flags() {
        let mut builder = InvocationBuilder::new();
        builder.extend_command(vec![String::from("nginx"), String::from("-g")]);
        builder.set_image("nginx:1.27");
        builder.push(Directive::Publish(String::from("80:80")));
        builder.push(Directive::Hostname(String::from("web")));

        let invocation = builder.finalize("web").expect("finalize failed");
        let args = invocation.cli_arguments().expect("render failed");
        assert_eq!(args.len(), 4);
        assert!(args[0].starts_with("--publish "));
        assert!(args[1].contains("nginx:1.27"));
        assert_eq!(&args[2..], &["nginx", "-g"]);
    }
}
