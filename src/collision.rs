//! Proximity checks between the bug and the world
//!
//! Plain distance-threshold tests, no physics. Detection never touches game
//! rules: every hit is reported as a [`CollisionEvent`] to a caller-supplied
//! [`CollisionSink`]. The one mutation is flipping a clover's `collected`
//! flag so a clover can be collected at most once.
//!
//! Distances exactly equal to a radius count as touching.

use glam::Vec3;

use crate::consts::*;
use crate::platform::{
    Clover, Collectible, CollectibleKind, CollectiblesManager, Critter, EnemyManager,
    MushroomVariant,
};

/// Spiders and slugs, checked by the enemy manager itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CritterKind {
    Spider,
    Slug,
}

impl CritterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CritterKind::Spider => "spider",
            CritterKind::Slug => "slug",
        }
    }
}

/// Something the bug touched this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionEvent {
    Clover { id: u32, four_leaf: bool },
    Mushroom { variant: MushroomVariant, now: f64 },
    Coin { value: u64 },
    BuddyBug,
    Enemy { id: u32 },
    Bee { id: u32 },
    Critter(CritterKind),
}

/// Receiver for collision events
pub trait CollisionSink {
    fn on_collision(&mut self, event: CollisionEvent);
}

/// Discards events; the proximity test still runs
impl CollisionSink for () {
    fn on_collision(&mut self, _event: CollisionEvent) {}
}

/// Queues events for the caller to apply after detection
impl CollisionSink for Vec<CollisionEvent> {
    fn on_collision(&mut self, event: CollisionEvent) {
        self.push(event);
    }
}

/// Inclusive distance test
#[inline]
pub fn within(a: Vec3, b: Vec3, radius: f32) -> bool {
    a.distance_squared(b) <= radius * radius
}

/// Collect the first uncollected clover in reach, if any.
///
/// At most one clover per call. The returned clover is already flagged.
pub fn check_clover_collisions<S: CollisionSink + ?Sized>(
    player_pos: Vec3,
    clovers: &mut [Clover],
    sink: &mut S,
) -> Option<Clover> {
    let clover = clovers
        .iter_mut()
        .filter(|c| !c.collected)
        .find(|c| within(player_pos, c.position, COLLECTION_RADIUS))?;

    clover.collected = true;
    sink.on_collision(CollisionEvent::Clover {
        id: clover.id,
        four_leaf: clover.four_leaf,
    });
    Some(*clover)
}

/// Let the collectibles manager find a pickup in reach and dispatch on its type
pub fn check_collectible_collisions<C, S>(
    player_pos: Vec3,
    collectibles: &mut C,
    now: f64,
    sink: &mut S,
) -> Option<Collectible>
where
    C: CollectiblesManager + ?Sized,
    S: CollisionSink + ?Sized,
{
    let item = collectibles.check_collection(player_pos, COLLECTION_RADIUS)?;
    let event = match item.kind {
        CollectibleKind::Mushroom(variant) => CollisionEvent::Mushroom { variant, now },
        CollectibleKind::Coin => CollisionEvent::Coin { value: COIN_VALUE },
        CollectibleKind::BuddyBug => CollisionEvent::BuddyBug,
    };
    sink.on_collision(event);
    Some(item)
}

fn first_within<'a>(player_pos: Vec3, critters: &'a [Critter], radius: f32) -> Option<&'a Critter> {
    critters.iter().find(|c| within(player_pos, c.position, radius))
}

/// Report the first enemy in range. Re-triggers every call while in range.
pub fn check_enemy_collisions<S: CollisionSink + ?Sized>(
    player_pos: Vec3,
    enemies: &[Critter],
    sink: &mut S,
) -> bool {
    match first_within(player_pos, enemies, ENEMY_COLLISION_RADIUS) {
        Some(enemy) => {
            sink.on_collision(CollisionEvent::Enemy { id: enemy.id });
            true
        }
        None => false,
    }
}

/// Report the first bee in range. Re-triggers every call while in range.
pub fn check_bee_collisions<S: CollisionSink + ?Sized>(
    player_pos: Vec3,
    bees: &[Critter],
    sink: &mut S,
) -> bool {
    match first_within(player_pos, bees, BEE_COLLISION_RADIUS) {
        Some(bee) => {
            sink.on_collision(CollisionEvent::Bee { id: bee.id });
            true
        }
        None => false,
    }
}

/// Spider and slug checks, delegated to the enemy manager. Spider wins a tie.
pub fn check_critter_collisions<E, S>(player_pos: Vec3, manager: &E, sink: &mut S) -> bool
where
    E: EnemyManager + ?Sized,
    S: CollisionSink + ?Sized,
{
    let spider = manager.check_spider_collisions(player_pos, CRITTER_COLLISION_RADIUS);
    let slug = manager.check_slug_collisions(player_pos, CRITTER_COLLISION_RADIUS);
    let kind = match (spider, slug) {
        (true, _) => CritterKind::Spider,
        (false, true) => CritterKind::Slug,
        (false, false) => return false,
    };
    sink.on_collision(CollisionEvent::Critter(kind));
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clover(id: u32, x: f32, four_leaf: bool) -> Clover {
        Clover::new(id, Vec3::new(x, 0.0, 0.0), four_leaf)
    }

    fn critter(id: u32, x: f32) -> Critter {
        Critter {
            id,
            position: Vec3::new(x, 0.0, 0.0),
        }
    }

    struct Pickups(Vec<Collectible>);

    impl CollectiblesManager for Pickups {
        fn check_collection(&mut self, pos: Vec3, radius: f32) -> Option<Collectible> {
            let idx = self.0.iter().position(|c| within(pos, c.position, radius))?;
            Some(self.0.remove(idx))
        }

        fn update(&mut self, _dt: f32, _now: f64) {}
    }

    struct Critters {
        spider: bool,
        slug: bool,
        radius_seen: std::cell::Cell<f32>,
    }

    impl EnemyManager for Critters {
        fn enemies(&self) -> &[Critter] {
            &[]
        }

        fn bees(&self) -> &[Critter] {
            &[]
        }

        fn check_spider_collisions(&self, _pos: Vec3, radius: f32) -> bool {
            self.radius_seen.set(radius);
            self.spider
        }

        fn check_slug_collisions(&self, _pos: Vec3, _radius: f32) -> bool {
            self.slug
        }
    }

    fn critters(spider: bool, slug: bool) -> Critters {
        Critters {
            spider,
            slug,
            radius_seen: std::cell::Cell::new(0.0),
        }
    }

    #[test]
    fn test_clover_collected_once() {
        let mut clovers = vec![clover(1, 2.0, false)];
        let mut events = Vec::new();

        let hit = check_clover_collisions(Vec3::ZERO, &mut clovers, &mut events);
        assert_eq!(hit.map(|c| c.id), Some(1));
        assert!(clovers[0].collected);
        assert_eq!(events, vec![CollisionEvent::Clover { id: 1, four_leaf: false }]);

        let again = check_clover_collisions(Vec3::ZERO, &mut clovers, &mut events);
        assert!(again.is_none());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_only_first_clover_per_call() {
        let mut clovers = vec![clover(1, 10.0, false), clover(2, 1.0, true), clover(3, 0.5, false)];
        let mut events = Vec::new();

        let hit = check_clover_collisions(Vec3::ZERO, &mut clovers, &mut events);
        assert_eq!(hit.map(|c| c.id), Some(2));
        assert!(!clovers[2].collected);
        assert_eq!(events, vec![CollisionEvent::Clover { id: 2, four_leaf: true }]);
    }

    #[test]
    fn test_clover_radius_boundary_is_inclusive() {
        let mut clovers = vec![clover(1, COLLECTION_RADIUS, false)];
        assert!(check_clover_collisions(Vec3::ZERO, &mut clovers, &mut ()).is_some());

        let mut clovers = vec![clover(1, COLLECTION_RADIUS + 0.01, false)];
        assert!(check_clover_collisions(Vec3::ZERO, &mut clovers, &mut ()).is_none());
    }

    #[test]
    fn test_clover_distance_is_3d() {
        // (1.5, 1.5, 1.5) is ~2.6 away
        let mut clovers = vec![Clover::new(1, Vec3::splat(1.5), false)];
        assert!(check_clover_collisions(Vec3::ZERO, &mut clovers, &mut ()).is_none());
    }

    #[test]
    fn test_null_sink_still_flags_clover() {
        let mut clovers = vec![clover(7, 1.0, false)];
        assert!(check_clover_collisions(Vec3::ZERO, &mut clovers, &mut ()).is_some());
        assert!(clovers[0].collected);
    }

    #[test]
    fn test_collectible_dispatch() {
        let mut pickups = Pickups(vec![
            Collectible {
                id: 1,
                kind: CollectibleKind::Coin,
                position: Vec3::new(1.0, 0.0, 0.0),
            },
            Collectible {
                id: 2,
                kind: CollectibleKind::Mushroom(MushroomVariant::Speed),
                position: Vec3::new(20.0, 0.0, 0.0),
            },
        ]);
        let mut events = Vec::new();

        let item = check_collectible_collisions(Vec3::ZERO, &mut pickups, 500.0, &mut events);
        assert_eq!(item.map(|c| c.id), Some(1));
        assert_eq!(events, vec![CollisionEvent::Coin { value: 50 }]);

        let far = Vec3::new(20.0, 0.0, 0.0);
        let item = check_collectible_collisions(far, &mut pickups, 700.0, &mut events);
        assert_eq!(item.map(|c| c.id), Some(2));
        assert_eq!(
            events[1],
            CollisionEvent::Mushroom {
                variant: MushroomVariant::Speed,
                now: 700.0
            }
        );

        let item = check_collectible_collisions(Vec3::ZERO, &mut pickups, 900.0, &mut events);
        assert!(item.is_none());
    }

    #[test]
    fn test_enemy_and_bee_radii() {
        let enemies = vec![critter(1, 5.0), critter(2, 1.5)];
        let mut events = Vec::new();
        assert!(check_enemy_collisions(Vec3::ZERO, &enemies, &mut events));
        assert_eq!(events, vec![CollisionEvent::Enemy { id: 2 }]);

        // 1.4 is inside the enemy radius but outside the bee radius
        let bees = vec![critter(3, 1.4)];
        assert!(!check_bee_collisions(Vec3::ZERO, &bees, &mut events));
        let bees = vec![critter(3, 1.2)];
        assert!(check_bee_collisions(Vec3::ZERO, &bees, &mut events));
        assert_eq!(events.last(), Some(&CollisionEvent::Bee { id: 3 }));
    }

    #[test]
    fn test_enemy_hits_repeat_while_in_range() {
        let enemies = vec![critter(1, 0.5)];
        let mut events = Vec::new();
        assert!(check_enemy_collisions(Vec3::ZERO, &enemies, &mut events));
        assert!(check_enemy_collisions(Vec3::ZERO, &enemies, &mut events));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_spider_beats_slug() {
        let mut events = Vec::new();
        let both = critters(true, true);
        assert!(check_critter_collisions(Vec3::ZERO, &both, &mut events));
        assert_eq!(events, vec![CollisionEvent::Critter(CritterKind::Spider)]);
        assert_eq!(both.radius_seen.get(), CRITTER_COLLISION_RADIUS);

        events.clear();
        assert!(check_critter_collisions(Vec3::ZERO, &critters(false, true), &mut events));
        assert_eq!(events, vec![CollisionEvent::Critter(CritterKind::Slug)]);

        assert!(!check_critter_collisions(Vec3::ZERO, &critters(false, false), &mut ()));
    }
}
