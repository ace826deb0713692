//! The game-selection meta-scene: lobby voting, countdown, delegation to the
//! chosen game, and the SELECT-hold-to-exit path back to the lobby.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use cube_proto::color::{Hsv, Rgb};
use cube_proto::raster::Raster;
use rand::Rng;

use crate::controller::registry::Registry;
use crate::controller::{Button, Edge};
use crate::prelude::*;
use crate::scene::{LcdWrites, Scene};

/// How many seconds the countdown starts from before a game begins.
pub const COUNTDOWN_START: i8 = 3;

/// Constructs a fresh instance of a selectable game.
pub type GameFactory = Rc<dyn Fn() -> Box<dyn Scene>>;

/// One selectable entry in the lobby menu.
pub struct GameEntry {
    /// Stable identifier used in votes and `scene.<name>` config lookups.
    pub id: String,
    /// Human-readable label rendered in the lobby menu.
    pub label: String,
    /// Builds a fresh instance of the game when it wins a vote.
    pub factory: GameFactory,
}

enum Phase {
    Lobby,
    Countdown { value: i8, last_tick: Instant },
    Playing,
}

/// The top-level meta-scene the renderer always runs; delegates to the
/// voted-in sub-game once one has been chosen.
pub struct GameScene {
    games: Vec<GameEntry>,
    registry: Rc<RefCell<Registry>>,
    dips: Vec<u16>,
    phase: Phase,
    menu_selections: HashMap<u16, usize>,
    menu_votes: HashMap<u16, String>,
    voting_states: HashMap<u16, bool>,
    current_game: Option<Box<dyn Scene>>,
    cube_angle: f64,
    cube_angular_velocity: f64,
}

impl GameScene {
    /// Builds the lobby over `games`, which must be non-empty and have unique ids.
    pub fn new(games: Vec<GameEntry>, registry: Rc<RefCell<Registry>>) -> Self {
        let dips = registry.borrow().dips().to_vec();
        Self {
            games,
            registry,
            dips,
            phase: Phase::Lobby,
            menu_selections: HashMap::new(),
            menu_votes: HashMap::new(),
            voting_states: HashMap::new(),
            current_game: None,
            cube_angle: 0.0,
            cube_angular_velocity: 0.3,
        }
    }

    fn all_voted(&self) -> bool {
        !self.dips.is_empty() && self.dips.iter().all(|dip| self.voting_states.get(dip).copied().unwrap_or(false))
    }

    fn tally_and_start(&mut self) {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for id in self.menu_votes.values() {
            *counts.entry(id.clone()).or_insert(0) += 1;
        }
        let Some(max_count) = counts.values().copied().max() else { return };
        let winners: Vec<&String> = counts.iter().filter(|(_, &c)| c == max_count).map(|(id, _)| id).collect();
        let winner = if winners.len() == 1 {
            winners[0].clone()
        } else {
            let idx = rand::thread_rng().gen_range(0..winners.len());
            winners[idx].clone()
        };

        let Some(entry) = self.games.iter().find(|g| g.id == winner) else { return };
        self.current_game = Some((entry.factory)());
        self.phase = Phase::Countdown { value: COUNTDOWN_START, last_tick: Instant::now() };
    }

    fn reset_to_lobby(&mut self) {
        if let Some(mut game) = self.current_game.take() {
            game.cleanup();
        }
        self.menu_selections.clear();
        self.menu_votes.clear();
        self.voting_states.clear();
        self.phase = Phase::Lobby;
        for &dip in &self.dips {
            self.registry.borrow().clear_select_hold(dip);
        }
    }

    fn restart_requested(&self) -> bool {
        self.dips
            .iter()
            .any(|&dip| self.registry.borrow().restart_signal(dip).blocking_wait().unwrap_or(false))
    }

    fn render_lobby(&mut self, raster: &mut Raster, t_seconds: f64) {
        raster.clear();
        self.cube_angle += self.cube_angular_velocity * (1.0 / 30.0);
        self.cube_angular_velocity *= 0.98;
        draw_spinning_wireframe_cube(raster, self.cube_angle, t_seconds);
    }

    fn render_countdown(&mut self, raster: &mut Raster, t_seconds: f64, value: i8) {
        raster.clear();
        draw_spinning_wireframe_cube(raster, self.cube_angle, t_seconds);
        draw_digit_glow(raster, value);
    }
}

impl Scene for GameScene {
    fn render(&mut self, raster: &mut Raster, t_seconds: f64) {
        match &mut self.phase {
            Phase::Lobby => self.render_lobby(raster, t_seconds),
            Phase::Countdown { value, last_tick } => {
                let value = *value;
                if last_tick.elapsed().as_secs_f64() >= 1.0 {
                    *last_tick = Instant::now();
                    if value <= 1 {
                        self.phase = Phase::Playing;
                    } else {
                        self.phase = Phase::Countdown { value: value - 1, last_tick: Instant::now() };
                    }
                }
                self.render_countdown(raster, t_seconds, value);
            }
            Phase::Playing => {
                if self.restart_requested() {
                    self.reset_to_lobby();
                    return;
                }
                if let Some(game) = self.current_game.as_mut() {
                    game.render(raster, t_seconds);
                } else {
                    self.reset_to_lobby();
                }
            }
        }
    }

    fn lcd_writes(&mut self) -> LcdWrites {
        let mut out: LcdWrites = HashMap::new();
        match self.phase {
            Phase::Lobby => {
                for &dip in &self.dips {
                    let selection = self.menu_selections.get(&dip).copied().unwrap_or(0);
                    let locked = self.voting_states.get(&dip).copied().unwrap_or(false);
                    let mut rows = Vec::new();
                    for (i, game) in self.games.iter().enumerate() {
                        let marker = if i == selection { ">" } else { " " };
                        rows.push((0, i.min(3), format!("{marker}{}", game.label)));
                    }
                    rows.push((0, 3, if locked { "READY".to_string() } else { "SELECT to lock in".to_string() }));
                    out.insert(dip, rows);
                }
            }
            Phase::Countdown { value, .. } => {
                for &dip in &self.dips {
                    out.insert(dip, vec![(0, 0, format!("Starting in {value}...")])]);
                }
            }
            Phase::Playing => {
                if let Some(game) = self.current_game.as_mut() {
                    out = game.lcd_writes();
                }
            }
        }
        out
    }

    fn on_button(&mut self, player_id: &str, button: Button, edge: Edge) {
        match self.phase {
            Phase::Lobby => self.on_lobby_button(player_id, button, edge),
            Phase::Countdown { .. } => {}
            Phase::Playing => {
                if let Some(game) = self.current_game.as_mut() {
                    game.on_button(player_id, button, edge);
                }
            }
        }
    }

    fn cleanup(&mut self) {
        if let Some(mut game) = self.current_game.take() {
            game.cleanup();
        }
    }
}

impl GameScene {
    fn dip_for_player(&self, player_id: &str) -> Option<u16> {
        // The registry maps DIP -> player_id internally; we only see the DIPs it
        // exposes, so we recover the mapping by asking it directly.
        self.registry.borrow().dip_for_player(player_id)
    }

    fn on_lobby_button(&mut self, player_id: &str, button: Button, edge: Edge) {
        let Some(dip) = self.dip_for_player(player_id) else { return };
        if edge != Edge::Pressed {
            return;
        }
        let game_count = self.games.len();
        if game_count == 0 {
            return;
        }
        match button {
            Button::Up => {
                self.voting_states.insert(dip, false);
                self.menu_votes.remove(&dip);
                let cur = self.menu_selections.entry(dip).or_insert(0);
                *cur = (*cur + game_count - 1) % game_count;
            }
            Button::Down => {
                self.voting_states.insert(dip, false);
                self.menu_votes.remove(&dip);
                let cur = self.menu_selections.entry(dip).or_insert(0);
                *cur = (*cur + 1) % game_count;
            }
            Button::Select => {
                let already_voted = self.voting_states.get(&dip).copied().unwrap_or(false);
                if already_voted {
                    self.voting_states.insert(dip, false);
                    self.menu_votes.remove(&dip);
                } else {
                    let selection = self.menu_selections.get(&dip).copied().unwrap_or(0);
                    self.menu_votes.insert(dip, self.games[selection].id.clone());
                    self.voting_states.insert(dip, true);
                    if self.all_voted() {
                        self.tally_and_start();
                    }
                }
            }
            _ => {}
        }
    }
}

fn draw_spinning_wireframe_cube(raster: &mut Raster, angle: f64, t_seconds: f64) {
    let (w, h, l) = (raster.width(), raster.height(), raster.length());
    if w == 0 || h == 0 || l == 0 {
        return;
    }
    let cx = (w as f64 - 1.0) / 2.0;
    let cy = (h as f64 - 1.0) / 2.0;
    let cz = (l as f64 - 1.0) / 2.0;
    let radius = cx.min(cy).min(cz).max(1.0) * 0.8;

    for (dx, dy, dz) in CUBE_VERTICES {
        let (x, z) = rotate(dx * radius, dz * radius, angle);
        let y = dy * radius;
        let px = (cx + x).round();
        let py = (cy + y).round();
        let pz = (cz + z).round();
        if px >= 0.0 && py >= 0.0 && pz >= 0.0 && (px as u16) < w && (py as u16) < h && (pz as u16) < l {
            let hue = ((t_seconds * 40.0) % 256.0) as u8;
            let color: Rgb = Hsv { h: hue, s: 200, v: 220 }.into();
            let _ = raster.set_pix(px as u16, py as u16, pz as u16, color);
        }
    }
}

fn draw_digit_glow(raster: &mut Raster, value: i8) {
    let (w, h) = (raster.width(), raster.height());
    if w == 0 || h == 0 {
        return;
    }
    let intensity = (40 + (value.max(0) as u16) * 60).min(255) as u8;
    let z = raster.length().saturating_sub(1);
    let _ = raster.set_pix(w / 2, h / 2, z, Rgb::new(intensity, intensity, intensity));
}

fn rotate(x: f64, z: f64, angle: f64) -> (f64, f64) {
    let (sin, cos) = angle.sin_cos();
    (x * cos - z * sin, x * sin + z * cos)
}

const CUBE_VERTICES: [(f64, f64, f64); 8] = [
    (-1.0, -1.0, -1.0),
    (1.0, -1.0, -1.0),
    (-1.0, 1.0, -1.0),
    (1.0, 1.0, -1.0),
    (-1.0, -1.0, 1.0),
    (1.0, -1.0, 1.0),
    (-1.0, 1.0, 1.0),
    (1.0, 1.0, 1.0),
];

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    fn make_scene(n_games: usize, n_controllers: usize) -> GameScene {
        let games = (0..n_games)
            .map(|i| GameEntry {
                id: format!("game{i}"),
                label: format!("Game {i}"),
                factory: Rc::new(|| Box::new(NoopGame) as Box<dyn Scene>),
            })
            .collect();
        let addrs = (0..n_controllers)
            .map(|i| crate::controller::ControllerAddress { dip: i as u16, ip: "127.0.0.1".into(), port: 1 })
            .collect();
        let mapping = (0..n_controllers).map(|i| (i as u16, format!("P{}", i + 1))).collect();
        let registry = Rc::new(RefCell::new(Registry::new(
            addrs,
            mapping,
            Duration::from_millis(20),
            Duration::from_millis(20),
        )));
        GameScene::new(games, registry)
    }

    struct NoopGame;
    impl Scene for NoopGame {
        fn render(&mut self, _raster: &mut Raster, _t: f64) {}
        fn on_button(&mut self, _player_id: &str, _button: Button, _edge: Edge) {}
    }

    #[test]
    fn starts_in_lobby_phase() {
        let scene = make_scene(2, 2);
        assert!(matches!(scene.phase, Phase::Lobby));
    }

    #[test]
    fn single_vote_does_not_start_with_two_controllers() {
        let mut scene = make_scene(2, 2);
        scene.on_lobby_button("P1", Button::Select, Edge::Pressed);
        assert!(matches!(scene.phase, Phase::Lobby));
    }

    #[test]
    fn both_voting_starts_countdown() {
        let mut scene = make_scene(1, 2);
        scene.on_lobby_button("P1", Button::Select, Edge::Pressed);
        scene.on_lobby_button("P2", Button::Select, Edge::Pressed);
        assert!(matches!(scene.phase, Phase::Countdown { value: COUNTDOWN_START, .. }));
        assert!(scene.current_game.is_some());
    }

    #[test]
    fn reselecting_select_unlocks_a_locked_in_vote() {
        let mut scene = make_scene(2, 2);
        scene.on_lobby_button("P1", Button::Select, Edge::Pressed);
        assert_eq!(scene.voting_states.get(&0), Some(&true));
        scene.on_lobby_button("P1", Button::Select, Edge::Pressed);
        assert_eq!(scene.voting_states.get(&0), Some(&false));
        assert!(!scene.menu_votes.contains_key(&0));
    }

    #[test]
    fn moving_selection_after_voting_clears_the_vote() {
        let mut scene = make_scene(3, 2);
        scene.on_lobby_button("P1", Button::Select, Edge::Pressed);
        assert_eq!(scene.voting_states.get(&0), Some(&true));
        scene.on_lobby_button("P1", Button::Down, Edge::Pressed);
        assert_eq!(scene.voting_states.get(&0), Some(&false));
        assert!(!scene.menu_votes.contains_key(&0));
        assert!(matches!(scene.phase, Phase::Lobby));
    }

    #[test]
    fn up_down_navigation_wraps_selection() {
        let mut scene = make_scene(3, 1);
        scene.on_lobby_button("P1", Button::Up, Edge::Pressed);
        assert_eq!(scene.menu_selections.get(&0), Some(&2));
        scene.on_lobby_button("P1", Button::Down, Edge::Pressed);
        assert_eq!(scene.menu_selections.get(&0), Some(&0));
    }
}
