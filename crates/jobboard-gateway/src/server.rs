//! Gateway server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware::from_fn_with_state,
    routing::{get, patch, post},
};
use jobboard_core::Config;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::GatewayError;
use crate::auth::{
    AuthSettings, CookieTransport, CredentialVerifier, FederationBridge, GoogleOAuthClient,
    HashCost, IdentityStore, RoleGate, SessionGuard, SledIdentityStore, TokenCodec, require_role,
    require_session,
};
use crate::handlers::{admin, auth, health_handler};
use crate::middleware::{
    ClientKeys, InProcessRateLimiter, RateLimitState, RateLimiter, rate_limit,
};

/// Gateway server state shared across handlers.
pub struct GatewayState {
    /// Token codec.
    pub codec: Arc<TokenCodec>,
    /// Session guard for protected routes.
    pub guard: Arc<SessionGuard>,
    /// Local secret verifier.
    pub verifier: CredentialVerifier,
    /// Identity storage.
    pub store: Arc<dyn IdentityStore>,
    /// Session cookie transport.
    pub cookies: CookieTransport,
    /// Federation bridge.
    pub bridge: Arc<FederationBridge>,
    /// Google OAuth client, when configured.
    pub google: Option<GoogleOAuthClient>,
    /// Limiter for credential endpoints.
    pub limiter: Arc<dyn RateLimiter>,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("codec", &self.codec)
            .field("cookies", &self.cookies)
            .field("google", &self.google)
            .finish_non_exhaustive()
    }
}

/// Gateway server.
#[derive(Debug)]
pub struct Gateway {
    config: Config,
    state: Arc<GatewayState>,
}

/// Builder for constructing a Gateway with its dependencies.
#[derive(Default)]
pub struct GatewayBuilder {
    config: Config,
    settings: Option<AuthSettings>,
    store: Option<Arc<dyn IdentityStore>>,
    verifier: Option<CredentialVerifier>,
    limiter: Option<Arc<dyn RateLimiter>>,
    google: Option<GoogleOAuthClient>,
}

impl GatewayBuilder {
    /// Create a new builder with default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set gateway configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use pre-resolved auth settings instead of deriving them from config.
    #[must_use]
    pub fn with_auth_settings(mut self, settings: AuthSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Set the identity store.
    #[must_use]
    pub fn with_identity_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the credential verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: CredentialVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Set the rate limiter for credential endpoints.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Set the Google OAuth client.
    #[must_use]
    pub fn with_google(mut self, client: GoogleOAuthClient) -> Self {
        self.google = Some(client);
        self
    }

    /// Build the gateway.
    ///
    /// # Errors
    ///
    /// Returns error if auth settings cannot be resolved or the identity
    /// store cannot be opened.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let config = self.config;

        let settings = match self.settings {
            Some(settings) => settings,
            None => AuthSettings::from_config(&config)
                .map_err(|e| GatewayError::Config(format!("Auth init failed: {e}")))?,
        };

        let store = match self.store {
            Some(store) => store,
            None => {
                let data_dir = config.data_dir();
                std::fs::create_dir_all(&data_dir)
                    .map_err(|e| GatewayError::Config(format!("Failed to create data dir: {e}")))?;
                Arc::new(
                    SledIdentityStore::open(&data_dir)
                        .map_err(|e| GatewayError::Server(format!("Failed to open store: {e}")))?,
                ) as Arc<dyn IdentityStore>
            }
        };

        let verifier = match self.verifier {
            Some(verifier) => verifier,
            None => CredentialVerifier::argon2(settings.hash_cost)
                .map_err(|e| GatewayError::Config(e.to_string()))?,
        };

        let limiter = self.limiter.unwrap_or_else(|| {
            Arc::new(InProcessRateLimiter::new(
                config.rate_limit.auth_requests_per_minute,
            ))
        });

        let google = match (self.google, &config.federation.google) {
            (Some(client), _) => Some(client),
            (None, Some(google)) => Some(
                GoogleOAuthClient::new(google, &config.server.backend_url, settings.secure_cookies)
                    .map_err(|e| GatewayError::Config(e.to_string()))?,
            ),
            (None, None) => {
                tracing::info!("Google sign-in not configured");
                None
            }
        };

        let codec = Arc::new(TokenCodec::new(&settings));
        let cookies = CookieTransport::new(&settings);
        let guard = Arc::new(SessionGuard::new(
            codec.clone(),
            store.clone(),
            cookies.clone(),
        ));
        let bridge = Arc::new(FederationBridge::new(
            codec.clone(),
            store.clone(),
            cookies.clone(),
            config.federation.redirects.clone(),
            config.server.frontend_url.clone(),
        ));

        let state = GatewayState {
            codec,
            guard,
            verifier,
            store,
            cookies,
            bridge,
            google,
            limiter,
        };

        Ok(Gateway {
            config,
            state: Arc::new(state),
        })
    }
}

impl Gateway {
    /// Create a gateway from configuration with default components.
    ///
    /// # Errors
    ///
    /// Returns error if the gateway cannot be built.
    pub fn new(config: Config) -> Result<Self, GatewayError> {
        GatewayBuilder::new().with_config(config).build()
    }

    /// Shared state.
    #[must_use]
    pub fn state(&self) -> Arc<GatewayState> {
        self.state.clone()
    }

    /// Build the HTTP router.
    pub fn router(&self) -> Router {
        let state = self.state.clone();

        let credentials = Router::new()
            .route("/register", post(auth::register))
            .route("/login", post(auth::login))
            .route_layer(from_fn_with_state(
                RateLimitState::new(
                    state.limiter.clone(),
                    ClientKeys::behind_proxies(self.config.rate_limit.trusted_proxies),
                ),
                rate_limit,
            ));

        let session = Router::new()
            .route("/me", get(auth::me))
            .route_layer(from_fn_with_state(state.guard.clone(), require_session));

        let open = Router::new()
            .route("/refresh", post(auth::refresh))
            .route("/logout", post(auth::logout))
            .route("/google", get(auth::google_start))
            .route("/google/callback", get(auth::google_callback));

        // Layers run bottom-up: session first, then the role gate
        let admin = Router::new()
            .route("/users", get(admin::list_users))
            .route("/users/{id}", patch(admin::update_user))
            .route_layer(from_fn_with_state(RoleGate::admin(), require_role))
            .route_layer(from_fn_with_state(state.guard.clone(), require_session));

        Router::new()
            .route("/health", get(health_handler))
            .nest("/api/auth", credentials.merge(session).merge(open))
            .nest("/api/admin", admin)
            .with_state(state)
            .layer(self.cors_layer())
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.server.timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .config
            .server
            .cors_origins()
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    }

    /// Run the gateway server.
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or the listener fails.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let app = self.router();

        let addr: SocketAddr = format!(
            "{}:{}",
            self.config.server.bind_address, self.config.server.port
        )
        .parse()
        .map_err(|e| GatewayError::Config(format!("Invalid address: {e}")))?;

        tracing::info!(
            environment = ?self.config.server.environment,
            secure_cookies = self.state.cookies.is_secure(),
            "Gateway API listening on http://{}",
            addr
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let handle = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
        });

        handle
            .await
            .map_err(|e| GatewayError::Server(format!("API server panic: {e}")))?
            .map_err(|e| GatewayError::Server(e.to_string()))?;

        Ok(())
    }
}
