// SSH会话管理
use crate::config::TunnelSpec;
use crate::ssh::transport::{ConnectTarget, Credential, Endpoint, Transport, TransportSession};
use crate::utils::error::{ClientError, Result};

/// One open transport session and the endpoint it was opened for.
pub struct SessionHandle<S: TransportSession> {
    session: S,
    endpoint: Endpoint,
    open: bool,
}

impl<S: TransportSession> SessionHandle<S> {
    fn new(session: S, endpoint: Endpoint) -> Self {
        Self {
            session,
            endpoint,
            open: true,
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn disconnect(&mut self) {
        if self.open {
            self.open = false;
            self.session.disconnect();
            log::debug!("Disconnected from {}", self.endpoint);
        }
    }
}

/// Which session serves channel operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The primary session talks to `host` itself.
    Direct { host: String },
    /// The primary session is the gateway, the secondary one reaches `host`
    /// through a local forward.
    Tunneled { host: String },
}

impl Route {
    pub fn host(&self) -> &str {
        match self {
            Route::Direct { host } | Route::Tunneled { host } => host,
        }
    }
}

/// Owns the direct or gateway session (primary) and the tunneled session
/// (secondary), and knows which one is active.
pub struct SessionManager<T: Transport> {
    transport: T,
    gateway: Option<TunnelSpec>,
    credential: Option<Credential>,
    primary: Option<SessionHandle<T::Session>>,
    secondary: Option<SessionHandle<T::Session>>,
    route: Option<Route>,
}

impl<T: Transport> SessionManager<T> {
    pub fn new(transport: T, gateway: Option<TunnelSpec>) -> Self {
        Self {
            transport,
            gateway,
            credential: None,
            primary: None,
            secondary: None,
            route: None,
        }
    }

    /// Replaces the credential used for the next connect. No I/O.
    pub fn authenticate(&mut self, credential: Credential) {
        self.credential = Some(credential);
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    pub fn primary(&self) -> Option<&SessionHandle<T::Session>> {
        self.primary.as_ref()
    }

    pub fn secondary(&self) -> Option<&SessionHandle<T::Session>> {
        self.secondary.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Connects straight to `host` on the SSH port. A live direct session to the
    /// same host is reused, one to another host is replaced. While a tunnel is
    /// open this fails with `TunnelOpen`, `close_all` has to come first.
    pub fn connect_direct(&mut self, host: &str) -> Result<()> {
        match (&self.route, &self.primary) {
            (Some(Route::Direct { host: current }), Some(_)) if current == host => {
                log::debug!("Already connected directly to {}", host);
                return Ok(());
            }
            (Some(Route::Tunneled { host: current }), Some(_)) => {
                return Err(ClientError::TunnelOpen {
                    current: current.clone(),
                    requested: host.to_string(),
                });
            }
            _ => {}
        }

        let credential = self.credential.clone().ok_or(ClientError::AuthConfig)?;
        self.close_all();

        let endpoint = Endpoint::ssh(host);
        let session = self
            .transport
            .connect(&ConnectTarget::direct(endpoint.clone()), &credential)
            .map_err(|source| ClientError::Connect {
                endpoint: endpoint.clone(),
                source,
            })?;

        log::debug!("Connected directly to {}", endpoint);
        self.primary = Some(SessionHandle::new(session, endpoint));
        self.route = Some(Route::Direct { host: host.to_string() });
        Ok(())
    }

    /// Connects to `host` through the configured gateway:
    /// the gateway session forwards a local port to `host`, then a second
    /// session logs in to the target over that port with the stored credential.
    ///
    /// An open tunnel to the same host is reused. An open tunnel to another host
    /// is an error, `close_all` has to come first.
    pub fn connect_via_tunnel(&mut self, host: &str) -> Result<()> {
        if self.secondary.is_some() {
            return match &self.route {
                Some(Route::Tunneled { host: current }) if current != host => Err(ClientError::TunnelTargetChanged {
                    current: current.clone(),
                    requested: host.to_string(),
                }),
                _ => {
                    log::debug!("Reusing tunnel to {}", host);
                    Ok(())
                }
            };
        }

        let credential = self.credential.clone().ok_or(ClientError::AuthConfig)?;
        let gateway = self.gateway.clone().ok_or(ClientError::MissingGateway)?;
        self.close_all();

        // 第一段：网关会话 + 本地端口转发
        let gateway_endpoint = gateway.endpoint();
        let mut first = self
            .transport
            .connect(&ConnectTarget::direct(gateway_endpoint.clone()), &gateway.credential())
            .map_err(|source| ClientError::Connect {
                endpoint: gateway_endpoint.clone(),
                source,
            })?;

        let target = Endpoint::new(host, gateway.target_port);
        if let Err(source) = first.forward_local(gateway.local_port, &target) {
            first.disconnect();
            return Err(ClientError::Connect {
                endpoint: gateway_endpoint,
                source,
            });
        }
        log::debug!("Forwarding local port {} to {}", gateway.local_port, target);

        // 第二段：经转发端口登录目标主机
        let forwarded = ConnectTarget::forwarded(Endpoint::new("localhost", gateway.local_port), target.clone());
        let second = match self.transport.connect(&forwarded, &credential) {
            Ok(session) => session,
            Err(source) => {
                first.disconnect();
                return Err(ClientError::Connect { endpoint: target, source });
            }
        };

        log::debug!("Connected from {} to {}", gateway_endpoint, target);
        self.primary = Some(SessionHandle::new(first, gateway_endpoint));
        self.secondary = Some(SessionHandle::new(second, target));
        self.route = Some(Route::Tunneled { host: host.to_string() });
        Ok(())
    }

    /// The session channel operations should use on the current route.
    pub fn active_session(&self) -> Result<&T::Session> {
        let handle = match self.route {
            Some(Route::Tunneled { .. }) => self.secondary.as_ref(),
            Some(Route::Direct { .. }) => self.primary.as_ref(),
            None => None,
        };
        handle
            .filter(|handle| handle.is_open())
            .map(SessionHandle::session)
            .ok_or(ClientError::NotConnected)
    }

    /// Disconnects the secondary session, then the primary one. Safe to call at
    /// any time, any number of times.
    pub fn close_all(&mut self) {
        if let Some(mut secondary) = self.secondary.take() {
            secondary.disconnect();
        }
        if let Some(mut primary) = self.primary.take() {
            primary.disconnect();
        }
        self.route = None;
    }
}

impl<T: Transport> Drop for SessionManager<T> {
    fn drop(&mut self) {
        self.close_all();
    }
}
