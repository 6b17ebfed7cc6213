use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        node::AudioNode,
        player::{EngineSettings, GuildPlayer, PlayerOptions},
    },
    error::MusicError,
};

type Slot = Arc<OnceCell<Arc<GuildPlayer>>>;
type Slots = DashMap<GuildId, Slot>;

/// Referencia débil que permite a un reproductor quitarse del registro al
/// destruirse. Un reproductor creado fuera de un registro usa `default()`.
#[derive(Clone, Default)]
pub struct RegistryLink {
    slots: Weak<Slots>,
}

impl RegistryLink {
    pub(crate) fn detach(&self, guild_id: GuildId, player: &GuildPlayer) {
        let Some(slots) = self.slots.upgrade() else {
            return;
        };

        // Solo si la entrada sigue siendo este reproductor
        let removed = slots.remove_if(&guild_id, |_, slot| {
            slot.get()
                .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), player))
        });
        if removed.is_some() {
            debug!("Reproductor de guild {} quitado del registro", guild_id);
        }
    }
}

/// Mapa de servidores a reproductores activos.
///
/// Garantiza como máximo un reproductor por servidor: las llamadas
/// concurrentes a [`PlayerRegistry::get_or_create`] comparten la misma
/// construcción y todas reciben la misma instancia.
pub struct PlayerRegistry {
    node: Arc<dyn AudioNode>,
    settings: EngineSettings,
    slots: Arc<Slots>,
}

impl PlayerRegistry {
    pub fn new(node: Arc<dyn AudioNode>, settings: EngineSettings) -> Self {
        Self {
            node,
            settings,
            slots: Arc::new(DashMap::new()),
        }
    }

    /// Reproductor activo del servidor, si existe
    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        let slot = self.slots.get(&guild_id)?.value().clone();
        slot.get().filter(|player| !player.is_destroyed()).cloned()
    }

    pub async fn get_or_create(
        &self,
        guild_id: GuildId,
        options: PlayerOptions,
    ) -> Result<Arc<GuildPlayer>, MusicError> {
        loop {
            let slot = self.slots.entry(guild_id).or_default().value().clone();

            let result = slot
                .get_or_try_init(|| {
                    GuildPlayer::create(
                        self.node.clone(),
                        guild_id,
                        options.clone(),
                        self.settings.clone(),
                        self.link(),
                    )
                })
                .await;

            match result {
                Ok(player) if !player.is_destroyed() => return Ok(player.clone()),
                Ok(player) => {
                    // Un destroy en curso: esperar a que libere el nodo antes
                    // de abrir otra sesión para el mismo servidor
                    let stale = player.clone();
                    stale.closed().await;
                    self.slots
                        .remove_if(&guild_id, |_, current| Arc::ptr_eq(current, &slot));
                }
                Err(e) => {
                    self.slots.remove_if(&guild_id, |_, current| {
                        Arc::ptr_eq(current, &slot) && current.get().is_none()
                    });
                    return Err(e);
                }
            }
        }
    }

    /// Destruye el reproductor del servidor. Devuelve `false` si no había uno.
    pub async fn remove(&self, guild_id: GuildId) -> Result<bool, MusicError> {
        let Some(player) = self.get(guild_id) else {
            return Ok(false);
        };

        player.destroy().await?;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .get()
                    .is_some_and(|player| !player.is_destroyed())
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.slots
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| *entry.key())
            .collect()
    }

    /// Destruye todos los reproductores (apagado del bot)
    pub async fn destroy_all(&self) {
        let guilds = self.guild_ids();

        info!("🛑 Destruyendo {} reproductores", guilds.len());
        for guild_id in guilds {
            if let Err(e) = self.remove(guild_id).await {
                warn!("⚠️ Error destruyendo reproductor de guild {}: {}", guild_id, e);
            }
        }
    }

    fn link(&self) -> RegistryLink {
        RegistryLink {
            slots: Arc::downgrade(&self.slots),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        node::{
            testing::{NodeCall, ScriptedNode},
            NodeEvent,
        },
        player::PlayerStatus,
    };
    use serenity::model::id::ChannelId;
    use std::time::Duration;

    const GUILD: GuildId = GuildId::new(1);

    fn options() -> PlayerOptions {
        PlayerOptions {
            text_channel_id: ChannelId::new(20),
            voice_channel_id: ChannelId::new(10),
            volume: 50,
            self_deaf: true,
        }
    }

    fn registry(node: Arc<ScriptedNode>) -> PlayerRegistry {
        PlayerRegistry::new(node, EngineSettings::default())
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_builds_one_player() {
        let node = Arc::new(ScriptedNode::new().with_connect_delay(Duration::from_millis(30)));
        let registry = registry(node.clone());

        let (first, second) = tokio::join!(
            registry.get_or_create(GUILD, options()),
            registry.get_or_create(GUILD, options())
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(node.connect_count(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.guild_ids(), vec![GUILD]);
    }

    #[tokio::test]
    async fn test_get_returns_existing_player() {
        let registry = registry(Arc::new(ScriptedNode::new()));
        assert!(registry.get(GUILD).is_none());

        let created = registry.get_or_create(GUILD, options()).await.unwrap();
        let found = registry.get(GUILD).unwrap();

        assert!(Arc::ptr_eq(&created, &found));
    }

    #[tokio::test]
    async fn test_destroy_removes_entry() {
        let registry = registry(Arc::new(ScriptedNode::new()));
        let player = registry.get_or_create(GUILD, options()).await.unwrap();

        player.destroy().await.unwrap();

        assert!(registry.get(GUILD).is_none());
        assert!(registry.is_empty());
        assert!(registry.guild_ids().is_empty());
    }

    #[tokio::test]
    async fn test_remove_destroys_player() {
        let node = Arc::new(ScriptedNode::new());
        let registry = registry(node.clone());
        let player = registry.get_or_create(GUILD, options()).await.unwrap();

        assert!(registry.remove(GUILD).await.unwrap());
        assert!(!registry.remove(GUILD).await.unwrap());
        assert_eq!(player.snapshot().await.status, PlayerStatus::Destroyed);
        assert!(!node.has_subscriber(GUILD));
    }

    #[tokio::test]
    async fn test_recreate_after_destroy_gives_new_player() {
        let node = Arc::new(ScriptedNode::new());
        let registry = registry(node.clone());
        let old = registry.get_or_create(GUILD, options()).await.unwrap();
        old.destroy().await.unwrap();

        let new = registry.get_or_create(GUILD, options()).await.unwrap();

        assert!(!Arc::ptr_eq(&old, &new));
        assert!(!new.is_destroyed());
        assert_eq!(node.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_node_disconnect_removes_entry() {
        let node = Arc::new(ScriptedNode::new());
        let registry = registry(node.clone());
        let player = registry.get_or_create(GUILD, options()).await.unwrap();

        node.emit(GUILD, NodeEvent::NodeDisconnect);
        tokio::time::timeout(Duration::from_secs(1), player.closed())
            .await
            .unwrap();

        assert!(registry.get(GUILD).is_none());
        assert!(registry.guild_ids().is_empty());
    }

    #[tokio::test]
    async fn test_failed_creation_leaves_no_entry() {
        let node = Arc::new(ScriptedNode::new());
        node.set_unavailable(true);
        let registry = registry(node.clone());

        let err = registry.get_or_create(GUILD, options()).await.err().unwrap();
        assert!(err.is_node_failure());
        assert!(registry.guild_ids().is_empty());

        node.set_unavailable(false);
        assert!(registry.get_or_create(GUILD, options()).await.is_ok());
    }

    #[tokio::test]
    async fn test_destroy_all() {
        let registry = registry(Arc::new(ScriptedNode::new()));
        for guild in 1..=3 {
            registry
                .get_or_create(GuildId::new(guild), options())
                .await
                .unwrap();
        }
        assert_eq!(registry.len(), 3);

        registry.destroy_all().await;

        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_get_or_create_waits_for_in_flight_destroy() {
        let node = Arc::new(ScriptedNode::new().with_call_delay(Duration::from_millis(50)));
        let registry = registry(node.clone());
        let old = registry.get_or_create(GUILD, options()).await.unwrap();

        let destroying = tokio::spawn({
            let old = old.clone();
            async move { old.destroy().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(old.is_destroyed());

        let new = registry.get_or_create(GUILD, options()).await.unwrap();
        destroying.await.unwrap().unwrap();

        assert!(!Arc::ptr_eq(&old, &new));
        assert!(!new.is_destroyed());
        assert!(Arc::ptr_eq(&registry.get(GUILD).unwrap(), &new));

        // La sesión vieja se libera antes de abrir la nueva
        let calls = node.calls(GUILD);
        let destroy_at = calls.iter().position(|call| *call == NodeCall::Destroy).unwrap();
        let reconnect_at = calls
            .iter()
            .rposition(|call| matches!(call, NodeCall::ConnectVoice(_)))
            .unwrap();
        assert!(destroy_at < reconnect_at);
        assert_eq!(node.connect_count(), 2);
    }
}
