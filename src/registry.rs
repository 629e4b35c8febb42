use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::args::{ArgFactory, Args};
use crate::pattern::{parse_pattern, ArgTypes};
use crate::types::{ConfigError, MethodError, Reply, MAX_ARGS};

/// A bound, invocable method.
///
/// Register an implementation with [`Methods::add_method`], or let
/// [`Methods::add`] bind a closure to the provider.
#[async_trait]
pub trait Method: Send + Sync {
    async fn call(&self, args: Args) -> Result<Reply, MethodError>;
}

/// Application object whose methods are exposed over HTTP.
///
/// `httpize` runs once when the [`Handler`](crate::Handler) is built and
/// declares every method with its parameters.
pub trait MethodProvider: Send + Sync + Sized + 'static {
    fn httpize(&self, methods: &mut Methods<Self>) -> Result<(), ConfigError>;
}

type BoxFuture = Pin<Box<dyn Future<Output = Result<Reply, MethodError>> + Send>>;
type UnboundFn<P> = Arc<dyn Fn(Arc<P>, Args) -> BoxFuture + Send + Sync>;

/// One declared parameter: the query key it binds to and its factory.
#[derive(Debug, Clone)]
pub struct ArgDef {
    pub(crate) name: String,
    pub(crate) factory: ArgFactory,
}

impl ArgDef {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A registered method: the bound callable and its ordered parameters.
pub struct CallDef {
    pub(crate) method: Arc<dyn Method>,
    pub(crate) arg_defs: Vec<ArgDef>,
}

impl CallDef {
    pub fn arg_defs(&self) -> &[ArgDef] {
        &self.arg_defs
    }
}

struct Declared<P> {
    func: UnboundFn<P>,
    arg_defs: Vec<ArgDef>,
}

/// Method declarations collected from a provider before binding.
pub struct Methods<P> {
    declared: HashMap<String, Declared<P>>,
}

impl<P> Default for Methods<P> {
    fn default() -> Self {
        Self {
            declared: HashMap::new(),
        }
    }
}

impl<P: MethodProvider> Methods<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a method.
    ///
    /// `arg_names[i]` is the query key bound by `factories[i]`; `f`
    /// receives the provider and the validated [`Args`] in that order.
    pub fn add<F, Fut>(
        &mut self,
        name: &str,
        arg_names: &[&str],
        factories: Vec<ArgFactory>,
        f: F,
    ) -> Result<(), ConfigError>
    where
        F: Fn(Arc<P>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, MethodError>> + Send + 'static,
    {
        if arg_names.len() != factories.len() {
            return Err(ConfigError::ArgCountMismatch {
                method: name.to_string(),
                names: arg_names.len(),
                factories: factories.len(),
            });
        }
        let specs = arg_names
            .iter()
            .map(|n| n.to_string())
            .zip(factories)
            .collect();
        self.declare(name, specs, f)
    }

    /// Declare a method backed by its own [`Method`] implementation
    /// instead of a closure over the provider.
    pub fn add_method(
        &mut self,
        name: &str,
        arg_names: &[&str],
        factories: Vec<ArgFactory>,
        method: Arc<dyn Method>,
    ) -> Result<(), ConfigError> {
        self.add(name, arg_names, factories, move |_provider: Arc<P>, args: Args| {
            let method = Arc::clone(&method);
            async move { method.call(args).await }
        })
    }

    /// Declare a method from a pattern such as `"/Echo?name SafeString"`,
    /// resolving the type names through `types`.
    pub fn add_pattern<F, Fut>(
        &mut self,
        pattern: &str,
        types: &ArgTypes,
        f: F,
    ) -> Result<(), ConfigError>
    where
        F: Fn(Arc<P>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, MethodError>> + Send + 'static,
    {
        let parsed = parse_pattern(pattern)?;
        let specs = parsed
            .args
            .into_iter()
            .map(|(arg, type_name)| types.resolve(&type_name).map(|factory| (arg, factory)))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        self.declare(&parsed.method, specs, f)
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.declared.contains_key(name)
    }

    fn declare<F, Fut>(
        &mut self,
        name: &str,
        specs: Vec<(String, ArgFactory)>,
        f: F,
    ) -> Result<(), ConfigError>
    where
        F: Fn(Arc<P>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, MethodError>> + Send + 'static,
    {
        if name.is_empty() || name.contains(['/', '?', '&']) {
            return Err(ConfigError::InvalidMethodName(name.to_string()));
        }
        if specs.len() > MAX_ARGS {
            return Err(ConfigError::TooManyArgs {
                method: name.to_string(),
                count: specs.len(),
            });
        }
        if self.declared.contains_key(name) {
            return Err(ConfigError::DuplicateMethod(name.to_string()));
        }

        let mut arg_defs: Vec<ArgDef> = Vec::with_capacity(specs.len());
        for (arg, factory) in specs {
            if arg.is_empty() || arg_defs.iter().any(|d| d.name == arg) {
                return Err(ConfigError::DuplicateArg {
                    method: name.to_string(),
                    arg,
                });
            }
            arg_defs.push(ArgDef { name: arg, factory });
        }

        let func: UnboundFn<P> = Arc::new(move |provider: Arc<P>, args: Args| -> BoxFuture {
            Box::pin(f(provider, args))
        });
        self.declared
            .insert(name.to_string(), Declared { func, arg_defs });
        Ok(())
    }

    /// Binding pass: attach every declaration to `provider`.
    pub(crate) fn bind(self, provider: Arc<P>) -> Registry {
        let calls = self
            .declared
            .into_iter()
            .map(|(name, decl)| {
                let method: Arc<dyn Method> = Arc::new(BoundMethod {
                    provider: Arc::clone(&provider),
                    func: decl.func,
                });
                (
                    name,
                    CallDef {
                        method,
                        arg_defs: decl.arg_defs,
                    },
                )
            })
            .collect();
        Registry { calls }
    }
}

struct BoundMethod<P> {
    provider: Arc<P>,
    func: UnboundFn<P>,
}

#[async_trait]
impl<P: MethodProvider> Method for BoundMethod<P> {
    async fn call(&self, args: Args) -> Result<Reply, MethodError> {
        (self.func)(Arc::clone(&self.provider), args).await
    }
}

/// Immutable method-name → [`CallDef`] table shared by all requests.
#[derive(Default)]
pub struct Registry {
    calls: HashMap<String, CallDef>,
}

impl Registry {
    /// Build a registry from `provider`'s declarations.
    pub fn from_provider<P: MethodProvider>(provider: Arc<P>) -> Result<Self, ConfigError> {
        let mut methods = Methods::new();
        provider.httpize(&mut methods)?;
        tracing::debug!(count = methods.len(), "methods declared");
        Ok(methods.bind(provider))
    }

    pub fn get(&self, name: &str) -> Option<&CallDef> {
        self.calls.get(name)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Registered method names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.calls.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{arg, SafeString};

    struct Provider;

    impl MethodProvider for Provider {
        fn httpize(&self, methods: &mut Methods<Self>) -> Result<(), ConfigError> {
            methods.add(
                "Echo",
                &["name"],
                vec![arg::<SafeString>()],
                |_p, args| async move {
                    let name = args.require::<SafeString>("name")?;
                    Ok(Reply::text(format!("Echo {name}")))
                },
            )?;
            methods.add("Greeting", &[], vec![], |_p, _args| async {
                Ok(Reply::text("Hello World"))
            })
        }
    }

    async fn noop(_p: Arc<Provider>, _args: Args) -> Result<Reply, MethodError> {
        Ok(Reply::text(""))
    }

    #[test]
    fn test_registry_from_provider() {
        let registry = Registry::from_provider(Arc::new(Provider)).unwrap();
        assert_eq!(registry.names(), vec!["Echo", "Greeting"]);
        let echo = registry.get("Echo").unwrap();
        assert_eq!(echo.arg_defs().len(), 1);
        assert_eq!(echo.arg_defs()[0].name(), "name");
        assert!(registry.get("Missing").is_none());
    }

    #[test]
    fn test_add_rejects_length_mismatch() {
        let mut methods = Methods::<Provider>::new();
        let err = methods
            .add("Echo", &["a", "b"], vec![arg::<SafeString>()], noop)
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::ArgCountMismatch {
                method: "Echo".into(),
                names: 2,
                factories: 1,
            }
        );
        assert!(methods.is_empty());
    }

    #[test]
    fn test_add_rejects_too_many_args() {
        let names: Vec<String> = (0..=MAX_ARGS).map(|i| format!("a{i}")).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let factories = vec![arg::<SafeString>(); names.len()];
        let mut methods = Methods::<Provider>::new();
        let err = methods.add("Big", &names, factories, noop).unwrap_err();
        assert!(matches!(err, ConfigError::TooManyArgs { count: 11, .. }));
    }

    #[test]
    fn test_add_accepts_max_args() {
        let names: Vec<String> = (0..MAX_ARGS).map(|i| format!("a{i}")).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let factories = vec![arg::<SafeString>(); names.len()];
        let mut methods = Methods::<Provider>::new();
        assert!(methods.add("Ten", &names, factories, noop).is_ok());
    }

    #[test]
    fn test_add_rejects_duplicate_method() {
        let mut methods = Methods::<Provider>::new();
        methods.add("Greeting", &[], vec![], noop).unwrap();
        let err = methods.add("Greeting", &[], vec![], noop).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateMethod("Greeting".into()));
    }

    #[test]
    fn test_add_rejects_duplicate_arg() {
        let mut methods = Methods::<Provider>::new();
        let err = methods
            .add(
                "Echo",
                &["name", "name"],
                vec![arg::<SafeString>(), arg::<SafeString>()],
                noop,
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateArg { .. }));
    }

    #[test]
    fn test_add_rejects_bad_method_name() {
        let mut methods = Methods::<Provider>::new();
        for bad in ["", "a/b", "a?b"] {
            let err = methods.add(bad, &[], vec![], noop).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidMethodName(_)));
        }
    }

    #[test]
    fn test_add_pattern() {
        let mut methods = Methods::<Provider>::new();
        methods
            .add_pattern("/Echo?name SafeString", &ArgTypes::with_builtins(), noop)
            .unwrap();
        assert!(methods.contains("Echo"));
        let registry = methods.bind(Arc::new(Provider));
        assert_eq!(registry.get("Echo").unwrap().arg_defs()[0].name(), "name");
    }

    #[test]
    fn test_add_pattern_unknown_type() {
        let mut methods = Methods::<Provider>::new();
        let err = methods
            .add_pattern("/Echo?name Mystery", &ArgTypes::with_builtins(), noop)
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownArgType("Mystery".into()));
    }

    struct Shout;

    #[async_trait]
    impl Method for Shout {
        async fn call(&self, args: Args) -> Result<Reply, MethodError> {
            let word = args.require::<SafeString>("word")?;
            Ok(Reply::text(word.as_str().to_uppercase()))
        }
    }

    #[tokio::test]
    async fn test_add_method_registers_trait_impl() {
        let mut methods = Methods::<Provider>::new();
        methods
            .add_method("Shout", &["word"], vec![arg::<SafeString>()], Arc::new(Shout))
            .unwrap();
        let registry = methods.bind(Arc::new(Provider));
        let shout = registry.get("Shout").unwrap();
        assert_eq!(shout.arg_defs()[0].name(), "word");

        let mut args = Args::default();
        args.push("word", arg::<SafeString>().create("hey").unwrap());
        let reply = shout.method.call(args).await.unwrap();
        assert!(reply.has_body());
    }

    #[test]
    fn test_add_method_checks_declaration() {
        let mut methods = Methods::<Provider>::new();
        let err = methods
            .add_method("Shout", &["word", "extra"], vec![arg::<SafeString>()], Arc::new(Shout))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ArgCountMismatch { .. }));
    }

    #[tokio::test]
    async fn test_bound_method_call() {
        let registry = Registry::from_provider(Arc::new(Provider)).unwrap();
        let greeting = registry.get("Greeting").unwrap();
        let reply = greeting.method.call(Args::default()).await.unwrap();
        assert!(reply.has_body());
    }
}
