use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    sync::Arc,
    time::Duration,
};

use log::{debug, info, warn};

use replicast_demo_spaces::{
    AudioSettings, Impact, LightBoard, LightEffect, LightState, PadBoard, PadBoardListener, Paint, PaintBlaster,
    PaintWall, Painter, ProjectileSpawner, Shot, SpacesError, VoiceClient, VoiceConfig,
    VoiceGroupMember,
};
use replicast_host::{HostConfig, SessionHost};
use replicast_participant::{LocalEffect, Participant, ParticipantConfig, Tempo};
use replicast_shared::{LogEntry, ManualClock, ObjectId, ParticipantLink};

const PAD_BOARD: ObjectId = ObjectId::new(1);
const LIGHT_BOARD: ObjectId = ObjectId::new(2);
const WALL: ObjectId = ObjectId::new(3);
const BLASTER: ObjectId = ObjectId::new(4);
const VOICE_BASE: u64 = 100;

const LOOP_PAD: u8 = 0;
const ONE_SHOT_PAD: u8 = 1;
const ONE_SHOT_FRAMES: u32 = 6;
const LIGHTS: u8 = 3;

/// A sound that plays for a number of frames
struct Sound {
    name: String,
    looping: bool,
    length: u32,
    remaining: u32,
}

impl Sound {
    fn new(name: String, looping: bool, length: u32) -> Self {
        Self {
            name,
            looping,
            length,
            remaining: 0,
        }
    }

    fn advance(&mut self) {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 && self.looping {
                self.remaining = self.length;
            }
        }
    }
}

impl LocalEffect for Sound {
    fn is_playing(&self) -> bool {
        self.remaining > 0
    }

    fn is_looping(&self) -> bool {
        self.looping
    }

    fn start(&mut self) {
        info!("{} starts", self.name);
        self.remaining = self.length;
    }

    fn stop(&mut self) {
        info!("{} stops", self.name);
        self.remaining = 0;
    }
}

/// Music channel of the local mixer
struct Mixer {
    index: usize,
    music_volume: Cell<f32>,
}

impl Mixer {
    fn new(index: usize) -> Self {
        Self {
            index,
            music_volume: Cell::new(1.0),
        }
    }
}

impl AudioSettings for Mixer {
    fn set_music_volume(&self, volume: f32) {
        if self.music_volume.replace(volume) != volume {
            info!("[{}] music volume set to {}", self.index, volume);
        }
    }
}

struct PadLogger(usize);

impl PadBoardListener for PadLogger {
    fn on_pad_status_changed(&mut self, pad: u8, active: bool) {
        info!("[{}] pad {} lit: {}", self.0, pad, active);
    }

    fn on_volume_changed(&mut self, volume: f32) {
        info!("[{}] master volume: {}", self.0, volume);
    }
}

struct Lamp(usize, u8);

impl LightEffect for Lamp {
    fn change_state(&mut self, state: LightState) {
        info!("[{}] light {}: {:?}", self.0, self.1, state);
    }
}

#[derive(Default)]
struct Canvas {
    painted: usize,
}

impl Painter for Canvas {
    fn paint(&mut self, paint: &Paint) {
        self.painted += 1;
        info!("paint at {:?}, {} so far", paint.uv, self.painted);
    }
}

struct Projectiles(usize);

impl ProjectileSpawner for Projectiles {
    fn spawn_projectile(&mut self, shot: &LogEntry<Shot>) {
        info!("[{}] projectile #{} fired by {}", self.0, shot.id, shot.source);
    }
}

struct Voice {
    transmitting: bool,
}

impl VoiceClient for Voice {
    fn speak_and_listen_only_to(&mut self, group: u8) {
        info!("speaking in group {}", group);
    }

    fn listen_to(&mut self, group: u8) {
        info!("listening to group {}", group);
    }

    fn stop_listening_to(&mut self, group: u8) {
        info!("no longer listening to group {}", group);
    }

    fn set_transmitting(&mut self, transmitting: bool) {
        self.transmitting = transmitting;
    }

    fn is_transmitting(&self) -> bool {
        self.transmitting
    }
}

/// Everything one participant has attached
struct Member {
    index: usize,
    participant: Participant<ParticipantLink>,
    clock: ManualClock,
    mixer: Arc<Mixer>,
    pads: Rc<RefCell<PadBoard<Sound>>>,
    lights: Rc<RefCell<LightBoard<Lamp>>>,
    wall: Rc<RefCell<PaintWall<Canvas>>>,
    blaster: Rc<RefCell<PaintBlaster<Projectiles>>>,
    voice: Rc<RefCell<VoiceGroupMember<Voice>>>,
}

impl Member {
    fn join(host: &mut SessionHost, index: usize) -> Result<Self, SpacesError> {
        let link = host.connect()?;
        let clock = ManualClock::new();
        let mut participant = Participant::new(ParticipantConfig::default(), link, Arc::new(clock.clone()));
        participant.fixed_tick()?;
        let mixer = Arc::new(Mixer::new(index));
        let settings: Arc<dyn AudioSettings> = mixer.clone();
        participant.services_mut().try_register(settings)?;

        let mut pads = PadBoard::new(&participant, PAD_BOARD, Tempo::default())?;
        pads.register_pad(LOOP_PAD, Sound::new(format!("[{}] loop", index), true, 4));
        pads.register_pad(
            ONE_SHOT_PAD,
            Sound::new(format!("[{}] one-shot", index), false, ONE_SHOT_FRAMES),
        );
        pads.set_listener(PadLogger(index));

        let mut lights = LightBoard::new(&participant, LIGHT_BOARD)?;
        for light in 0..LIGHTS {
            lights.register_light(light, Lamp(index, light))?;
        }

        let wall = Rc::new(RefCell::new(PaintWall::new(&participant, WALL, Canvas::default())?));
        let mut blaster = PaintBlaster::new(
            &participant,
            BLASTER,
            Projectiles(index),
            Duration::from_millis(500),
        )?;
        blaster.add_target(WALL, wall.clone());

        let voice = VoiceGroupMember::new(
            &participant,
            ObjectId::new(VOICE_BASE + index as u64),
            VoiceConfig::default(),
            Voice {
                transmitting: false,
            },
        )?;

        let member = Self {
            index,
            participant,
            clock,
            mixer,
            pads: Rc::new(RefCell::new(pads)),
            lights: Rc::new(RefCell::new(lights)),
            wall,
            blaster: Rc::new(RefCell::new(blaster)),
            voice: Rc::new(RefCell::new(voice)),
        };
        member.attach_all()
    }

    fn attach_all(mut self) -> Result<Self, SpacesError> {
        self.participant.attach(self.pads.clone())?;
        self.participant.attach(self.lights.clone())?;
        self.participant.attach(self.wall.clone())?;
        self.participant.attach(self.blaster.clone())?;
        self.participant.attach(self.voice.clone())?;
        Ok(self)
    }

    fn frame(&mut self, elapsed: Duration) -> Result<(), SpacesError> {
        self.clock.advance(elapsed);
        self.participant.frame(elapsed)?;
        for event in self.participant.take_events() {
            debug!("[{}] {:?}", self.index, event);
        }
        let mut pads = self.pads.borrow_mut();
        for pad in [LOOP_PAD, ONE_SHOT_PAD] {
            if let Some(sound) = pads.pad_effect_mut(pad) {
                sound.advance();
            }
        }
        Ok(())
    }
}

/// Two participants sharing one space, driven frame by frame
pub struct App {
    host: SessionHost,
    members: Vec<Member>,
    frame: Duration,
}

impl App {
    pub fn new() -> Result<Self, SpacesError> {
        info!("Replicast Spaces demo started");
        let mut host = SessionHost::new(HostConfig::default());
        let members = vec![Member::join(&mut host, 0)?, Member::join(&mut host, 1)?];
        Ok(Self {
            host,
            members,
            frame: ParticipantConfig::default().tick_interval,
        })
    }

    pub fn run(&mut self) -> Result<(), SpacesError> {
        self.frames(3)?;

        info!("-- participant 1 plays the one-shot pad and lowers the volume");
        {
            let member = &self.members[1];
            let pads = member.pads.borrow();
            pads.change_pad_state(&member.participant, ONE_SHOT_PAD, true)?;
            pads.change_volume(&member.participant, 0.8)?;
            pads.change_volume(&member.participant, 0.5)?;
        }
        self.frames(ONE_SHOT_FRAMES as usize * 3)?;

        info!("-- participant 0 switches a light on and dims it");
        {
            let member = &self.members[0];
            let lights = member.lights.borrow();
            lights.change_light_state(&member.participant, 2, true)?;
            lights.change_movement_state(&member.participant, 2, true)?;
            lights.change_intensity(&member.participant, 2, 0.25)?;
        }
        self.frames(6)?;

        info!("-- participant 1 takes the paint gun and fires at the wall");
        self.fire(1)?;
        self.frames(6)?;

        info!("-- voices of both participants meet");
        self.check_voices([[0.0, 0.0, 0.0], [3.0, 0.0, 4.0]]);
        info!("-- participant 1 walks away");
        self.check_voices([[0.0, 0.0, 0.0], [30.0, 0.0, 0.0]]);

        self.report();
        Ok(())
    }

    fn frames(&mut self, count: usize) -> Result<(), SpacesError> {
        for _ in 0..count {
            self.host.update();
            for member in &mut self.members {
                member.frame(self.frame)?;
            }
        }
        Ok(())
    }

    fn fire(&mut self, index: usize) -> Result<(), SpacesError> {
        let member = &self.members[index];
        let request = member.participant.request_authority(BLASTER)?;
        let blaster = member.blaster.clone();
        member.participant.spawn(async move {
            if !request.await.is_granted() {
                return;
            }
            let mut blaster = blaster.borrow_mut();
            let shot = Shot {
                origin: [0.0, 1.5, 0.0],
                direction: [0.0, 0.0, 1.0],
                projectile: None,
            };
            let impact = Impact {
                target: WALL,
                paint: Paint {
                    uv: [0.5, 0.5],
                    color: [255, 0, 128, 255],
                    size: 1.0,
                },
            };
            let fired = blaster.shoot(shot).and_then(|_| blaster.record_impact(impact));
            if let Err(error) = fired {
                warn!("could not fire: {}", error);
            }
        })?;
        Ok(())
    }

    fn check_voices(&mut self, positions: [[f32; 3]; 2]) {
        let peers: Vec<_> = self
            .members
            .iter()
            .zip(positions.iter())
            .map(|(member, position)| member.voice.borrow().as_peer(*position))
            .collect();
        for (member, position) in self.members.iter().zip(positions.iter()) {
            member
                .voice
                .borrow_mut()
                .check_proximity(*position, &peers, false);
        }
    }

    fn report(&self) {
        for (index, member) in self.members.iter().enumerate() {
            let pads = member.pads.borrow();
            let voice = member.voice.borrow();
            info!(
                "[{}] one-shot pad: {}, music volume: {}, light 2: {:?}, paints on wall: {}, listening to {} members",
                index,
                pads.pad_state(ONE_SHOT_PAD),
                member.mixer.music_volume.get(),
                member.lights.borrow().light_state(2),
                member.wall.borrow().painter().painted,
                voice.listened_count(),
            );
        }
        info!(
            "host: pad board held by {:?}, blaster held by {:?}",
            self.host.holder(PAD_BOARD),
            self.host.holder(BLASTER)
        );
    }
}
