//! Deterministic placeholder stories.
//!
//! Served when nothing has been generated for a subject yet. Known personas
//! get hand-written copy; any other valid subject gets a generic template.

use solartales_core::{
    AgeGroup, GeneratedStory, SpaceWeatherContext, StoryOrigin, Subject, Timestamp,
};

struct Persona {
    key: &'static str,
    title: &'static str,
    body: &'static str,
    facts: &'static [&'static str],
}

const PERSONAS: &[Persona] = &[
    Persona {
        key: "astronaut",
        title: "Starlight Over the Station",
        body: "Commander Mia floated to the big round window of the space station. \
Far below, Earth glowed blue and white. Mission control called: the Sun had been \
busy today! Mia smiled and checked the radiation monitor, just like she practised. \
Everything was calm, so she waved at the sleepy planet and wrote in her logbook: \
\"The Sun is our neighbour, and we keep a careful eye on it.\"",
        facts: &[
            "Astronauts can see auroras from space as glowing rings around the poles.",
            "The space station has extra shielding where the crew sleeps.",
        ],
    },
    Persona {
        key: "pilot",
        title: "The Quiet Radio",
        body: "Captain Leo flew high above the clouds on the way to a snowy city near \
the North Pole. The radio crackled, then went quiet. \"That's the Sun saying hello,\" \
Leo told his co-pilot. They switched to the satellite radio and everything worked \
again. Out the window, a ribbon of green light danced across the sky.",
        facts: &[
            "Solar flares can make shortwave radios fade for a little while.",
            "Some polar flights change their route when the Sun is very active.",
        ],
    },
    Persona {
        key: "farmer",
        title: "The Tractor That Listened to the Sky",
        body: "Farmer Rosa's tractor uses GPS to drive in perfectly straight rows. \
One morning the little screen blinked: the signal was wobbly. Rosa looked up at the \
clear blue sky and laughed. \"The Sun must be stirring things up!\" She waited until \
lunch, the signal came back, and the rows were straight as ever.",
        facts: &[
            "GPS signals travel through the upper atmosphere, which space weather can disturb.",
            "Many farm machines steer themselves using satellite positioning.",
        ],
    },
    Persona {
        key: "power_grid_operator",
        title: "Keeping the Lights On",
        body: "In a room full of glowing screens, Sam watched the power lines that carry \
electricity to millions of homes. A message arrived: a magnetic storm was coming. \
Sam and the team adjusted the grid, step by step, so nothing would overheat. That \
night every light stayed on, and nobody even noticed the storm had passed.",
        facts: &[
            "Strong geomagnetic storms can push extra currents into long power lines.",
            "Grid operators get space-weather warnings so they can prepare.",
        ],
    },
    Persona {
        key: "aurora_hunter",
        title: "Chasing the Northern Lights",
        body: "Ava zipped up her warm coat and carried her camera into the dark, snowy \
field. The space-weather forecast said tonight might be special. She waited and \
waited, and then the sky began to shimmer: green curtains, then pink edges, swirling \
over the hills. Ava forgot to take pictures at first because she was too busy saying \"wow.\"",
        facts: &[
            "Auroras happen when particles from the Sun meet Earth's atmosphere.",
            "Green auroras come from oxygen about 100 to 300 kilometres up.",
        ],
    },
    Persona {
        key: "radio_operator",
        title: "Messages Across the World",
        body: "Grandpa Joe loves talking to friends all over the world with his ham radio. \
Today the crackles were louder than usual. \"The Sun is having a busy day,\" he \
explained, turning the dial to a different frequency. Soon a voice from far away \
said hello, and Joe wrote the new friend's call sign in his notebook.",
        facts: &[
            "Radio signals can bounce off a layer of the atmosphere called the ionosphere.",
            "Solar activity changes which radio frequencies travel the farthest.",
        ],
    },
];

/// Timestamp carried by every placeholder.
pub fn placeholder_timestamp() -> Timestamp {
    // DateTime<Utc>::default() is the Unix epoch.
    Timestamp::default()
}

/// Whether `subject` has hand-written placeholder copy.
pub fn has_persona(subject: &Subject) -> bool {
    PERSONAS.iter().any(|p| p.key == subject.as_str())
}

/// The placeholder story for `subject`. Same input, same output.
pub fn placeholder_story(subject: &Subject, age_group: Option<AgeGroup>) -> GeneratedStory {
    let (title, body, facts) = match PERSONAS.iter().find(|p| p.key == subject.as_str()) {
        Some(persona) => (
            persona.title.to_string(),
            persona.body.to_string(),
            persona.facts.iter().map(|f| f.to_string()).collect(),
        ),
        None => {
            let name = subject.display_name();
            (
                format!("A Sunny Day for the {}", title_case(&name)),
                format!(
                    "Today the {name} looked up at the sky and wondered what the Sun was up to. \
The Sun is a giant ball of hot gas that sometimes sends out bursts of energy. \
Scientists all over the world watch it closely, so the {name} can get on with the \
day knowing that somebody is keeping an eye on space weather. A new story is on its way!"
                ),
                vec![
                    "The Sun is about 150 million kilometres from Earth.".to_string(),
                    "Light from the Sun takes about eight minutes to reach us.".to_string(),
                ],
            )
        }
    };

    GeneratedStory {
        id: format!("placeholder-{}", subject),
        subject: subject.clone(),
        age_group,
        title,
        body,
        educational_facts: facts,
        context: SpaceWeatherContext::quiet(),
        generated_at: placeholder_timestamp(),
        origin: StoryOrigin::Placeholder,
    }
}

fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
