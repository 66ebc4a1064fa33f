//! The election service run by every node: lifecycle handlers, the
//! authorization guard, and the callback through which the overlay asks
//! this node to join protocols started elsewhere.

use std::sync::Arc;

use rand::{distributions::Alphanumeric, Rng};
use rocket::tokio;

use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        api::{
            Cast, CastReply, GetBox, GetBoxReply, GetMixes, GetMixesReply, Link, LinkReply, Login,
            LoginReply, Open, OpenReply, Ping, Shuffle, ShuffleReply,
        },
        auth::Sessions,
        chain::{fetch_election, fetch_master, store, Ledger},
        election::{Ballot, Election, Stage},
        id::LedgerId,
        master::{self, Master},
        User,
    },
    overlay::{
        GenericConfig, Overlay, OverlayError, ProtocolFactory, ProtocolInstance, ServerIdentity,
        TreeNodeInstance, TreeShape,
    },
    protocol::{
        dkg::{self, DkgProtocol, SharedSecret},
        shuffle::{self, ShuffleProtocol},
    },
    scheduled_task::PeriodicTask,
};

pub use secrets::Secrets;
pub use sync::{Run, Synchronizer};

#[cfg(feature = "decrypt")]
mod decrypt;
mod secrets;
mod sync;

/// Length of the pin that authenticates link requests.
const PIN_LEN: usize = 6;

pub struct Service {
    identity: ServerIdentity,
    overlay: Overlay,
    ledger: Arc<dyn Ledger>,
    sessions: Arc<Sessions>,
    secrets: Secrets,
    pin: String,
    config: Config,
    _sweeper: PeriodicTask,
}

impl Service {
    /// Start the service of node `identity` and make it reachable through
    /// `overlay`. Must be called from within a tokio runtime.
    pub async fn new(
        identity: ServerIdentity,
        overlay: Overlay,
        ledger: Arc<dyn Ledger>,
        config: &Config,
    ) -> Arc<Self> {
        let sessions = Arc::new(Sessions::new(config.session_ttl()));
        let sweeper = sessions.schedule(config.session_sweep());
        let service = Arc::new(Self {
            identity: identity.clone(),
            overlay: overlay.clone(),
            ledger,
            sessions,
            secrets: Secrets::default(),
            pin: nonce(PIN_LEN),
            config: config.clone(),
            _sweeper: sweeper,
        });

        let factory: Arc<dyn ProtocolFactory> = service.clone();
        overlay.register(identity, Arc::downgrade(&factory)).await;
        info!("Service {} started, link pin: {}", service.identity, service.pin);
        service
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The pin expected by [`Service::link`].
    pub fn pin(&self) -> &str {
        &self.pin
    }

    /// This node's share of the key of election `id`, if it took part in
    /// the election's key generation.
    pub async fn shared_secret(&self, id: &LedgerId) -> Option<SharedSecret> {
        self.secrets.get(id).await
    }

    fn ledger(&self) -> &dyn Ledger {
        &*self.ledger
    }

    /// Probe the service: the nonce comes back incremented by one.
    pub fn ping(&self, req: Ping) -> Ping {
        Ping {
            nonce: req.nonce.wrapping_add(1),
        }
    }

    /// Register a new master chain. A request without a pin only logs the
    /// current pin, so an operator with access to the logs can retry.
    pub async fn link(&self, req: Link) -> Result<LinkReply> {
        if req.pin.is_empty() {
            info!("Current session pin: {}", self.pin);
            return Ok(LinkReply::default());
        } else if req.pin != self.pin {
            return Err(Error::WrongPin);
        }

        let id = self.ledger.create(&req.roster).await?;
        let master = Master {
            key: req.key,
            id,
            roster: req.roster,
            admins: req.admins,
        };
        store(self.ledger(), &id, master).await?;
        info!("Linked master {}", id.short());
        Ok(LinkReply { master: Some(id) })
    }

    /// Open an election under a master. Runs key generation over the
    /// master's roster; the caller becomes the election's creator.
    ///
    /// On timeout the fresh election chain is left behind without a header.
    pub async fn open(&self, req: Open) -> Result<OpenReply> {
        let stamp = self
            .sessions
            .lookup(&req.token)
            .await
            .ok_or(Error::NotLoggedIn)?;
        if !stamp.admin {
            return Err(Error::NeedAdmin);
        }

        let master = fetch_master(self.ledger(), &req.master).await?;
        let id = self.ledger.create(&master.roster).await?;

        let run = Run {
            roster: &master.roster,
            shape: TreeShape::FullRoster,
            name: dkg::NAME,
            timeout: self.config.dkg_timeout(),
            expired: Error::DkgTimeout,
        };
        let secret = Synchronizer::new(id)
            .run(&self.overlay, &self.identity, run, |node| {
                let (protocol, finished) = DkgProtocol::new(node);
                (Box::new(protocol) as Box<dyn ProtocolInstance>, finished)
            })
            .await?;
        let key = secret.x;
        self.secrets.insert(&id, secret).await;

        let election = Election::new(
            req.election,
            id,
            master.id,
            stamp.user,
            master.roster.clone(),
            key,
        );
        store(self.ledger(), &id, election).await?;
        store(self.ledger(), &master.id, master::Link { genesis: id }).await?;
        info!("Opened election {} under master {}", id.short(), master.id.short());

        Ok(OpenReply { id, key })
    }

    /// Log a user in under a master, listing the elections they take part in.
    pub async fn login(&self, req: Login) -> Result<LoginReply> {
        let master = fetch_master(self.ledger(), &req.master).await?;
        let mut elections = Vec::new();
        for link in master.links(self.ledger()).await? {
            let election = fetch_election(self.ledger(), &link.genesis).await?;
            if election.is_user(req.user) {
                elections.push(election);
            }
        }

        let admin = master.is_admin(req.user);
        let token = self.sessions.register(req.user, admin).await;
        debug!("User {} logged in (admin: {admin})", req.user);
        Ok(LoginReply {
            token,
            admin,
            elections,
        })
    }

    /// Cast a ballot on behalf of the caller.
    pub async fn cast(&self, req: Cast) -> Result<CastReply> {
        let (user, election) = self
            .retrieve(&req.token, &req.id, false, Some(Stage::Running))
            .await?;
        let ballot = Ballot { user, ..req.ballot };
        let index = store(self.ledger(), &election.id, ballot).await?;
        Ok(CastReply { index })
    }

    pub async fn get_box(&self, req: GetBox) -> Result<GetBoxReply> {
        let (_, election) = self.retrieve(&req.token, &req.id, false, None).await?;
        let ballot_box = election.ballot_box(self.ledger()).await?;
        Ok(GetBoxReply { ballot_box })
    }

    pub async fn get_mixes(&self, req: GetMixes) -> Result<GetMixesReply> {
        let (_, election) = self.retrieve(&req.token, &req.id, false, None).await?;
        let mixes = election.mixes(self.ledger()).await?;
        Ok(GetMixesReply { mixes })
    }

    /// Freeze the cast ballots and mix them on this node.
    ///
    /// The mix runs on a single-node tree rooted here; the rest of the
    /// roster verifies it through the ledger rather than re-running it.
    pub async fn shuffle(&self, req: Shuffle) -> Result<ShuffleReply> {
        let (_, election) = self
            .retrieve(&req.token, &req.id, true, Some(Stage::Running))
            .await?;

        let frozen = election.ballot_box(self.ledger()).await?;
        store(self.ledger(), &election.id, frozen).await?;

        let roster = election.roster.clone();
        let run = Run {
            roster: &roster,
            shape: TreeShape::SingleNode,
            name: shuffle::NAME,
            timeout: self.config.shuffle_timeout(),
            expired: Error::ShuffleTimeout,
        };
        let ledger = self.ledger.clone();
        Synchronizer::new(election.id)
            .run(&self.overlay, &self.identity, run, move |node| {
                let (protocol, finished) = ShuffleProtocol::new(node, election, ledger);
                (Box::new(protocol) as Box<dyn ProtocolInstance>, finished)
            })
            .await?;
        Ok(ShuffleReply {})
    }

    /// Authenticate `token` and resolve election `id` for it.
    ///
    /// With `admin` the caller must be an admin and the election's creator,
    /// otherwise a listed voter or the creator. A `stage` of `None` skips the
    /// stage check.
    pub async fn retrieve(
        &self,
        token: &str,
        id: &LedgerId,
        admin: bool,
        stage: Option<Stage>,
    ) -> Result<(User, Election)> {
        let stamp = self.sessions.lookup(token).await.ok_or(Error::NotLoggedIn)?;
        if admin && !stamp.admin {
            return Err(Error::NeedAdmin);
        }

        let election = fetch_election(self.ledger(), id).await?;
        if admin && !election.is_creator(stamp.user) {
            return Err(Error::NeedCreator);
        } else if !admin && !election.is_user(stamp.user) {
            return Err(Error::NotPart);
        }
        match stage {
            Some(expected) if expected != election.stage => Err(Error::InvalidState),
            _ => Ok((stamp.user, election)),
        }
    }
}

#[rocket::async_trait]
impl ProtocolFactory for Service {
    async fn new_protocol(
        &self,
        mut node: TreeNodeInstance,
        config: &GenericConfig,
    ) -> Result<Box<dyn ProtocolInstance>> {
        let sync = Synchronizer::from_config(config)?;
        // Joined instances stop waiting once the initiator would have.
        let deadline = match node.protocol_name() {
            dkg::NAME => self.config.dkg_timeout(),
            shuffle::NAME => self.config.shuffle_timeout(),
            _ => self.config.decrypt_timeout(),
        };
        node.set_deadline(deadline);
        trace!(
            "{} joins {} for election {}",
            self.identity,
            node.protocol_name(),
            sync.id.short()
        );

        match node.protocol_name() {
            dkg::NAME => {
                let (protocol, finished) = DkgProtocol::new(node);
                let secrets = self.secrets.clone();
                tokio::spawn(async move {
                    match finished.await {
                        Ok(Ok(secret)) => {
                            secrets.insert(&sync.id, secret).await;
                            debug!("Stored key share for election {}", sync.id.short());
                        }
                        Ok(Err(e)) => warn!(
                            "Key generation for election {} failed: {e}",
                            sync.id.short()
                        ),
                        Err(_) => warn!(
                            "Key generation for election {} ended without a share",
                            sync.id.short()
                        ),
                    }
                });
                Ok(Box::new(protocol))
            }
            shuffle::NAME => {
                let election = fetch_election(self.ledger(), &sync.id).await?;
                let (protocol, _) = ShuffleProtocol::new(node, election, self.ledger.clone());
                Ok(Box::new(protocol))
            }
            #[cfg(feature = "decrypt")]
            crate::protocol::decrypt::NAME => self.join_decrypt(node, &sync).await,
            other => Err(OverlayError::UnknownProtocol(other.to_string()).into()),
        }
    }
}

fn nonce(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rocket::tokio::time::sleep;

    use super::*;
    use crate::{
        cluster::LocalCluster,
        crypto::{public, random_scalar},
        model::{
            api::GetMixesReply,
            chain::{LedgerError, MemoryLedger, Record},
            election::{BallotBox, ElectionDraft},
        },
        overlay::{Roster, Tree},
    };

    /// A ledger whose mix appends are confirmed only after `delay`.
    struct SlowMixes {
        inner: MemoryLedger,
        delay: Duration,
    }

    #[rocket::async_trait]
    impl Ledger for SlowMixes {
        async fn create(&self, roster: &Roster) -> std::result::Result<LedgerId, LedgerError> {
            self.inner.create(roster).await
        }

        async fn append(
            &self,
            id: &LedgerId,
            record: Record,
        ) -> std::result::Result<usize, LedgerError> {
            if let Record::Mix(_) = record {
                sleep(self.delay).await;
            }
            self.inner.append(id, record).await
        }

        async fn records(&self, id: &LedgerId) -> std::result::Result<Vec<Record>, LedgerError> {
            self.inner.records(id).await
        }
    }

    /// Log admin 0 in on node 0 and open an election for `users`.
    async fn open_election(cluster: &LocalCluster, users: Vec<User>) -> (String, OpenReply) {
        let master = cluster.link(vec![0]).await.unwrap();
        let service = cluster.node(0);
        let login = service.login(Login { master, user: 0 }).await.unwrap();
        let reply = service
            .open(Open {
                token: login.token.clone(),
                master,
                election: ElectionDraft::example(users),
            })
            .await
            .unwrap();
        (login.token, reply)
    }

    fn get_box(token: &str, id: LedgerId) -> GetBox {
        GetBox {
            token: token.to_string(),
            id,
        }
    }

    fn shuffle(token: &str, id: LedgerId) -> Shuffle {
        Shuffle {
            token: token.to_string(),
            id,
        }
    }

    #[backend_test]
    async fn ping_every_node(cluster: LocalCluster) {
        for service in cluster.services() {
            assert_eq!(service.ping(Ping { nonce: 0 }), Ping { nonce: 1 });
        }
        assert_eq!(cluster.node(0).ping(Ping { nonce: u32::MAX }).nonce, 0);
    }

    #[backend_test]
    async fn link_checks_pin(cluster: LocalCluster) {
        let service = cluster.node(1);
        let mut request = Link {
            pin: String::new(),
            key: public(&random_scalar()),
            roster: cluster.roster(),
            admins: vec![0],
        };
        assert_eq!(service.link(request.clone()).await.unwrap(), LinkReply::default());

        request.pin = format!("{}x", service.pin());
        assert!(matches!(service.link(request.clone()).await, Err(Error::WrongPin)));

        request.pin = service.pin().to_string();
        let master = service.link(request.clone()).await.unwrap().master.unwrap();
        let stored = fetch_master(cluster.ledger(), &master).await.unwrap();
        assert_eq!(stored.roster, request.roster);
        assert_eq!(stored.admins, request.admins);
        assert_eq!(stored.key, request.key);
    }

    #[backend_test]
    async fn open_generates_one_key_across_nodes(cluster: LocalCluster) {
        let (_, opened) = open_election(&cluster, vec![1]).await;

        // Non-root nodes store their share in the background.
        sleep(Duration::from_millis(250)).await;
        let mut shares = Vec::new();
        for service in cluster.services() {
            let secret = service.shared_secret(&opened.id).await.unwrap();
            assert_eq!(secret.x, opened.key);
            shares.push(secret.v);
        }
        assert_eq!(public(&shares.iter().sum()), opened.key);

        let election = fetch_election(cluster.ledger(), &opened.id).await.unwrap();
        assert_eq!(election.key, opened.key);
        assert_eq!(election.creator, 0);
        assert_eq!(election.roster, cluster.roster());
    }

    #[backend_test]
    async fn open_needs_admin_session(cluster: LocalCluster) {
        let master = cluster.link(vec![0]).await.unwrap();
        let service = cluster.node(0);
        let open = |token: &str| Open {
            token: token.to_string(),
            master,
            election: ElectionDraft::example(vec![]),
        };
        assert!(matches!(service.open(open("")).await, Err(Error::NotLoggedIn)));

        let voter = service.login(Login { master, user: 1 }).await.unwrap();
        assert!(!voter.admin);
        assert!(matches!(service.open(open(&voter.token)).await, Err(Error::NeedAdmin)));
    }

    #[backend_test]
    async fn open_then_box_is_empty_and_running(cluster: LocalCluster) {
        let (token, opened) = open_election(&cluster, vec![1]).await;
        let reply = cluster.node(0).get_box(get_box(&token, opened.id)).await.unwrap();
        assert_eq!(reply.ballot_box, BallotBox::default());
        let (_, election) = cluster
            .node(0)
            .retrieve(&token, &opened.id, false, None)
            .await
            .unwrap();
        assert_eq!(election.stage, Stage::Running);
    }

    #[backend_test]
    async fn login_lists_own_elections(cluster: LocalCluster) {
        let (_, opened) = open_election(&cluster, vec![1]).await;
        let master = fetch_election(cluster.ledger(), &opened.id)
            .await
            .unwrap()
            .master;

        let service = cluster.node(2);
        let voter = service.login(Login { master, user: 1 }).await.unwrap();
        assert_eq!(voter.elections.len(), 1);
        assert_eq!(voter.elections[0].id, opened.id);
        let creator = service.login(Login { master, user: 0 }).await.unwrap();
        assert!(creator.admin);
        assert_eq!(creator.elections.len(), 1);
        let stranger = service.login(Login { master, user: 2 }).await.unwrap();
        assert!(stranger.elections.is_empty());
    }

    #[backend_test]
    async fn cast_ballots_in_append_order(cluster: LocalCluster) {
        let (_, opened) = open_election(&cluster, vec![1]).await;
        let master = fetch_election(cluster.ledger(), &opened.id)
            .await
            .unwrap()
            .master;

        // Casts may reach any node.
        let mut cast = Vec::new();
        for (i, service) in cluster.services().iter().enumerate() {
            let login = service.login(Login { master, user: 1 }).await.unwrap();
            let ballot = Ballot::example(1, &opened.key, i as u32);
            let reply = service
                .cast(Cast {
                    token: login.token,
                    id: opened.id,
                    ballot: ballot.clone(),
                })
                .await
                .unwrap();
            assert_eq!(reply.index, 2 + i);
            cast.push(ballot);
        }

        // The creator sees every ballot the voter cast.
        let creator = cluster.node(0).login(Login { master, user: 0 }).await.unwrap();
        let reply = cluster
            .node(0)
            .get_box(get_box(&creator.token, opened.id))
            .await
            .unwrap();
        assert_eq!(reply.ballot_box.ballots.len(), 3);
        assert_eq!(reply.ballot_box.ballots, cast);
    }

    #[backend_test]
    async fn shuffle_mixes_every_ballot(cluster: LocalCluster) {
        let (token, opened) = open_election(&cluster, vec![1]).await;
        let service = cluster.node(0);
        for choice in 0..4 {
            service
                .cast(Cast {
                    token: token.clone(),
                    id: opened.id,
                    ballot: Ballot::example(0, &opened.key, choice),
                })
                .await
                .unwrap();
        }

        service.shuffle(shuffle(&token, opened.id)).await.unwrap();
        let mixes = GetMixes {
            token: token.clone(),
            id: opened.id,
        };
        let first: GetMixesReply = service.get_mixes(mixes.clone()).await.unwrap();
        assert_eq!(first.mixes.len(), 1);
        assert_eq!(first.mixes[0].ballots.len(), 4);
        assert_eq!(&first.mixes[0].node, service.identity());
        assert_eq!(service.get_mixes(mixes).await.unwrap(), first);

        // The election moved on: no more casting or shuffling.
        let (_, election) = service
            .retrieve(&token, &opened.id, false, None)
            .await
            .unwrap();
        assert_eq!(election.stage, Stage::Shuffled);
        let frozen = election.frozen_box(service.ledger()).await.unwrap().unwrap();
        assert_eq!(frozen.ballots.len(), 4);
        let late = service
            .cast(Cast {
                token: token.clone(),
                id: opened.id,
                ballot: Ballot::example(0, &opened.key, 1),
            })
            .await;
        assert!(matches!(late, Err(Error::InvalidState)));
        assert!(matches!(
            service.shuffle(shuffle(&token, opened.id)).await,
            Err(Error::InvalidState)
        ));
        // The box still reads, its stage check is skipped.
        let reply = service.get_box(get_box(&token, opened.id)).await.unwrap();
        assert_eq!(reply.ballot_box.ballots.len(), 4);
    }

    #[backend_test]
    async fn shuffle_needs_creator(cluster: LocalCluster) {
        let (_, opened) = open_election(&cluster, vec![1, 2]).await;
        let service = cluster.node(0);
        service.sessions().insert("other-admin", 2, true).await;
        service.sessions().insert("voter", 1, false).await;

        assert!(matches!(
            service.shuffle(shuffle("other-admin", opened.id)).await,
            Err(Error::NeedCreator)
        ));
        assert!(matches!(
            service.shuffle(shuffle("voter", opened.id)).await,
            Err(Error::NeedAdmin)
        ));
        let (_, election) = service
            .retrieve("voter", &opened.id, false, None)
            .await
            .unwrap();
        assert_eq!(election.stage, Stage::Running);
    }

    #[backend_test]
    async fn guard_rejects_unknown_tokens(cluster: LocalCluster) {
        let (_, opened) = open_election(&cluster, vec![1]).await;
        let service = cluster.node(1);
        for token in ["", "unknown", "0"] {
            let cast = Cast {
                token: token.to_string(),
                id: opened.id,
                ballot: Ballot::example(1, &opened.key, 0),
            };
            assert!(matches!(service.cast(cast).await, Err(Error::NotLoggedIn)));
            assert!(matches!(
                service.get_box(get_box(token, opened.id)).await,
                Err(Error::NotLoggedIn)
            ));
            let mixes = GetMixes {
                token: token.to_string(),
                id: opened.id,
            };
            assert!(matches!(service.get_mixes(mixes).await, Err(Error::NotLoggedIn)));
            assert!(matches!(
                service.shuffle(shuffle(token, opened.id)).await,
                Err(Error::NotLoggedIn)
            ));
        }
    }

    #[backend_test]
    async fn guard_admits_voters_and_creator(cluster: LocalCluster) {
        let service = cluster.node(0);
        let election = Election::seed(cluster.ledger(), cluster.roster(), 0, vec![1, 2], 0).await;
        for user in 0..5 {
            let token = format!("user{user}");
            service.sessions().insert(&token, user, false).await;
            let result = service.retrieve(&token, &election.id, false, None).await;
            if election.is_user(user) {
                assert_eq!(result.unwrap(), (user, election.clone()));
            } else {
                assert!(matches!(result, Err(Error::NotPart)));
            }
        }
    }

    #[backend_test]
    async fn get_box_returns_every_cast_ballot(cluster: LocalCluster) {
        let service = cluster.node(0);
        service.sessions().insert("0", 0, false).await;
        let election = Election::seed(cluster.ledger(), cluster.roster(), 0, vec![0], 3).await;

        let reply = service.get_box(get_box("0", election.id)).await.unwrap();
        assert_eq!(reply.ballot_box.ballots.len(), 3);
    }

    #[backend_test]
    async fn get_box_without_token(cluster: LocalCluster) {
        let service = cluster.node(0);
        service.sessions().insert("0", 0, false).await;
        let election = Election::seed(cluster.ledger(), cluster.roster(), 0, vec![0], 3).await;

        assert!(matches!(
            service.get_box(get_box("", election.id)).await,
            Err(Error::NotLoggedIn)
        ));
    }

    #[backend_test]
    async fn get_box_not_part(cluster: LocalCluster) {
        let service = cluster.node(0);
        service.sessions().insert("1", 1, false).await;
        let election = Election::seed(cluster.ledger(), cluster.roster(), 0, vec![0], 3).await;

        assert!(matches!(
            service.get_box(get_box("1", election.id)).await,
            Err(Error::NotPart)
        ));
    }

    #[backend_test(1)]
    async fn single_node_cluster_runs_everything(cluster: LocalCluster) {
        let (token, opened) = open_election(&cluster, vec![]).await;
        let service = cluster.node(0);
        assert_eq!(
            public(&service.shared_secret(&opened.id).await.unwrap().v),
            opened.key
        );
        service
            .cast(Cast {
                token: token.clone(),
                id: opened.id,
                ballot: Ballot::example(0, &opened.key, 1),
            })
            .await
            .unwrap();
        service.shuffle(shuffle(&token, opened.id)).await.unwrap();
    }

    #[backend_test]
    async fn unknown_protocol_is_refused(cluster: LocalCluster) {
        let roster = cluster.roster();
        let tree: Tree = roster
            .generate_tree(TreeShape::SingleNode, &roster.list[0])
            .unwrap();
        let node = Overlay::new().create_protocol("bogus", tree);
        let config = Synchronizer::new(LedgerId::digest(b"bogus"))
            .to_config()
            .unwrap();
        assert!(matches!(
            cluster.node(1).new_protocol(node, &config).await,
            Err(Error::Overlay(OverlayError::UnknownProtocol(name))) if name == "bogus"
        ));
    }

    #[rocket::async_test]
    async fn unreachable_node_times_out_key_generation() {
        let config = Config::default().with_timeouts(200);
        let cluster = LocalCluster::new(2, &config).await;
        let service = cluster.node(0);

        // The roster names a node that never joins.
        let mut roster = cluster.roster();
        roster.list.push(ServerIdentity::new("local://ghost"));
        let master = service
            .link(Link {
                pin: service.pin().to_string(),
                key: public(&random_scalar()),
                roster,
                admins: vec![0],
            })
            .await
            .unwrap()
            .master
            .unwrap();
        let login = service.login(Login { master, user: 0 }).await.unwrap();

        let result = service
            .open(Open {
                token: login.token,
                master,
                election: ElectionDraft::example(vec![1]),
            })
            .await;
        assert!(matches!(result, Err(Error::DkgTimeout)));
        // Nothing was linked under the master.
        let stored = fetch_master(cluster.ledger(), &master).await.unwrap();
        assert!(stored.links(cluster.ledger()).await.unwrap().is_empty());
        cluster.shutdown().await;
    }

    #[rocket::async_test]
    async fn slow_mix_times_out_shuffle() {
        let ledger = Arc::new(SlowMixes {
            inner: MemoryLedger::new(),
            delay: Duration::from_millis(500),
        });
        let identity = ServerIdentity::new("local://node0");
        let overlay = Overlay::new();
        let config = Config::default().with_timeouts(100);
        let service = Service::new(identity.clone(), overlay.clone(), ledger.clone(), &config).await;

        let master = service
            .link(Link {
                pin: service.pin().to_string(),
                key: public(&random_scalar()),
                roster: Roster::new(vec![identity.clone()]),
                admins: vec![0],
            })
            .await
            .unwrap()
            .master
            .unwrap();
        let login = service.login(Login { master, user: 0 }).await.unwrap();
        let opened = service
            .open(Open {
                token: login.token.clone(),
                master,
                election: ElectionDraft::example(vec![]),
            })
            .await
            .unwrap();
        service
            .cast(Cast {
                token: login.token.clone(),
                id: opened.id,
                ballot: Ballot::example(0, &opened.key, 2),
            })
            .await
            .unwrap();

        let result = service.shuffle(shuffle(&login.token, opened.id)).await;
        assert!(matches!(result, Err(Error::ShuffleTimeout)));
        // The frozen box stays, and the abandoned mix still lands.
        let (_, election) = service
            .retrieve(&login.token, &opened.id, false, None)
            .await
            .unwrap();
        assert!(election.frozen_box(&*ledger).await.unwrap().is_some());
        sleep(Duration::from_millis(600)).await;
        assert_eq!(election.mixes(&*ledger).await.unwrap().len(), 1);
        overlay.unregister(&identity).await;
    }

    #[rocket::async_test]
    async fn open_outside_roster_is_refused() {
        let cluster = LocalCluster::new(2, &Config::default()).await;
        let service = cluster.node(0);
        let roster = Roster::new(vec![cluster.node(1).identity().clone()]);
        let master = service
            .link(Link {
                pin: service.pin().to_string(),
                key: public(&random_scalar()),
                roster,
                admins: vec![0],
            })
            .await
            .unwrap()
            .master
            .unwrap();
        let login = service.login(Login { master, user: 0 }).await.unwrap();
        let result = service
            .open(Open {
                token: login.token,
                master,
                election: ElectionDraft::example(vec![]),
            })
            .await;
        assert!(matches!(
            result,
            Err(Error::Overlay(OverlayError::NotInRoster(_)))
        ));
        cluster.shutdown().await;
    }

    #[cfg(feature = "decrypt")]
    #[backend_test(1)]
    async fn out_of_range_choice_is_undecryptable(cluster: LocalCluster) {
        use crate::{crypto::MAX_CHOICE, model::api::Decrypt};

        let (token, opened) = open_election(&cluster, vec![]).await;
        let service = cluster.node(0);
        service
            .cast(Cast {
                token: token.clone(),
                id: opened.id,
                ballot: Ballot::example(0, &opened.key, MAX_CHOICE + 5000),
            })
            .await
            .unwrap();
        service.shuffle(shuffle(&token, opened.id)).await.unwrap();

        let result = service
            .decrypt(Decrypt {
                token: token.clone(),
                id: opened.id,
            })
            .await;
        assert!(matches!(result, Err(Error::Undecryptable(0))));
        let (_, election) = service
            .retrieve(&token, &opened.id, false, None)
            .await
            .unwrap();
        assert_eq!(election.stage, Stage::Shuffled);
    }

    #[cfg(feature = "decrypt")]
    #[backend_test]
    async fn decrypt_recovers_every_choice(cluster: LocalCluster) {
        use crate::model::api::Decrypt;

        let (token, opened) = open_election(&cluster, vec![]).await;
        sleep(Duration::from_millis(250)).await;
        let service = cluster.node(0);
        let decrypt = Decrypt {
            token: token.clone(),
            id: opened.id,
        };
        assert!(matches!(
            service.decrypt(decrypt.clone()).await,
            Err(Error::InvalidState)
        ));

        let choices = [4, 0, 17];
        for choice in choices {
            service
                .cast(Cast {
                    token: token.clone(),
                    id: opened.id,
                    ballot: Ballot::example(0, &opened.key, choice),
                })
                .await
                .unwrap();
        }
        service.shuffle(shuffle(&token, opened.id)).await.unwrap();

        let mut reply = service.decrypt(decrypt.clone()).await.unwrap();
        reply.choices.sort_unstable();
        assert_eq!(reply.choices, vec![0, 4, 17]);
        let (_, election) = service
            .retrieve(&token, &opened.id, false, None)
            .await
            .unwrap();
        assert_eq!(election.stage, Stage::Decrypted);
        let recorded = election.decryption(service.ledger()).await.unwrap().unwrap();
        assert_eq!(recorded.choices.len(), 3);
        assert!(matches!(
            service.decrypt(decrypt).await,
            Err(Error::InvalidState)
        ));
    }
}
