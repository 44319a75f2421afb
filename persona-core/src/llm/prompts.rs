//! Prompt templates.
//!
//! Templates are plain text with `{{name}}` placeholders. A [`PromptRegistry`]
//! is built once, handed to [`super::LlmCognition`] and never changed
//! afterwards. Every prompt carries the JSON schema its reply must follow.

use serde_json::Value;
use std::collections::HashMap;

use super::schema::*;
use crate::cognition::{CognitionError, CognitionResult};

/// One named template and the reply schema that goes with it.
#[derive(Debug, Clone)]
pub struct Prompt {
    name: String,
    template: String,
    schema_name: String,
    schema: Value,
}

impl Prompt {
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        schema_name: impl Into<String>,
        schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            schema_name: schema_name.into(),
            schema,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Substitute every placeholder. A placeholder without a value is an error.
    pub fn render(&self, vars: &[(&str, &str)]) -> CognitionResult<String> {
        let mut out = String::with_capacity(self.template.len() * 2);
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| {
                CognitionError::Template(format!("{}: unclosed placeholder", self.name))
            })?;
            let key = after[..close].trim();
            let value = vars
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| *v)
                .ok_or_else(|| {
                    CognitionError::Template(format!("{}: no value for {{{{{key}}}}}", self.name))
                })?;
            out.push_str(value);
            rest = &after[close + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Immutable set of prompts keyed by name.
#[derive(Debug, Clone, Default)]
pub struct PromptRegistry {
    prompts: HashMap<String, Prompt>,
}

macro_rules! prompt {
    ($name:expr, $reply:ty, $template:expr) => {
        Prompt::new($name, $template, <$reply>::schema_name(), <$reply>::json_schema())
    };
}

impl PromptRegistry {
    /// An empty registry, to be filled with [`PromptRegistry::with_prompt`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a prompt.
    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.prompts.insert(prompt.name.clone(), prompt);
        self
    }

    pub fn get(&self, name: &str) -> CognitionResult<&Prompt> {
        self.prompts
            .get(name)
            .ok_or_else(|| CognitionError::Template(format!("unknown prompt {name}")))
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// The stock prompt set.
    pub fn standard() -> Self {
        Self::new()
            .with_prompt(prompt!("poignancy_event_v1", PoignancyReply, POIGNANCY_EVENT))
            .with_prompt(prompt!("poignancy_thought_v1", PoignancyReply, POIGNANCY_THOUGHT))
            .with_prompt(prompt!("poignancy_chat_v1", PoignancyReply, POIGNANCY_CHAT))
            .with_prompt(prompt!("valence_event_v1", ValenceReply, VALENCE_EVENT))
            .with_prompt(prompt!("valence_thought_v1", ValenceReply, VALENCE_THOUGHT))
            .with_prompt(prompt!("valence_chat_v1", ValenceReply, VALENCE_CHAT))
            .with_prompt(prompt!("wake_up_hour_v2", WakeUpReply, WAKE_UP_HOUR))
            .with_prompt(prompt!("daily_planning_v7", DailyPlanReply, DAILY_PLANNING))
            .with_prompt(prompt!("generate_hourly_schedule_v2", HourlyScheduleReply, HOURLY_SCHEDULE))
            .with_prompt(prompt!("task_decomp_v3", DecompositionReply, TASK_DECOMP))
            .with_prompt(prompt!("new_decomp_schedule_v2", ReactionScheduleReply, NEW_DECOMP_SCHEDULE))
            .with_prompt(prompt!("action_location_sector_v3", ChoiceReply, ACTION_SECTOR))
            .with_prompt(prompt!("action_location_arena_v1", ChoiceReply, ACTION_ARENA))
            .with_prompt(prompt!("action_object_v3", ChoiceReply, ACTION_OBJECT))
            .with_prompt(prompt!("generate_pronunciatio_v2", EmojiReply, PRONUNCIATIO))
            .with_prompt(prompt!("generate_event_triple_v2", TripleReply, EVENT_TRIPLE))
            .with_prompt(prompt!("generate_obj_event_v2", ObjectStateReply, OBJECT_EVENT))
            .with_prompt(prompt!("decide_to_talk_v3", DecideToTalkReply, DECIDE_TO_TALK))
            .with_prompt(prompt!("decide_to_react_v2", DecideToWaitReply, DECIDE_TO_REACT))
            .with_prompt(prompt!("iterative_convo_v2", UtteranceReply, ITERATIVE_CONVO))
            .with_prompt(prompt!("summarize_chat_relationship_v2", RelationshipReply, CHAT_RELATIONSHIP))
            .with_prompt(prompt!("summarize_conversation_v2", SummaryReply, SUMMARIZE_CONVERSATION))
            .with_prompt(prompt!("planning_thought_on_convo_v2", PlanningThoughtReply, PLANNING_THOUGHT))
            .with_prompt(prompt!("memo_on_convo_v1", MemoReply, MEMO_ON_CONVO))
            .with_prompt(prompt!("generate_focal_pt_v2", FocalPointsReply, FOCAL_POINTS))
            .with_prompt(prompt!("insight_and_evidence_v2", InsightsReply, INSIGHT_AND_EVIDENCE))
            .with_prompt(prompt!("describe_agent_feelings_v1", FeelingsReply, AGENT_FEELINGS))
            .with_prompt(prompt!("extract_scheduling_information_v1", SchedulingMemoryReply, SCHEDULING_INFORMATION))
            .with_prompt(prompt!("generate_currently_v1", CurrentlyReply, GENERATE_CURRENTLY))
            .with_prompt(prompt!("revise_daily_requirements_v1", DailyRequirementsReply, DAILY_REQUIREMENTS))
    }
}

const POIGNANCY_EVENT: &str = r#"Here is a brief description of {{name}}:
{{identity}}

On a scale of 1 to 10, where 1 is purely mundane (e.g., brushing teeth, making bed) and 10 is extremely poignant (e.g., a break up, college acceptance), rate the likely poignancy of the following event for {{name}}.

Event: {{event}}"#;

const POIGNANCY_THOUGHT: &str = r#"Here is a brief description of {{name}}:
{{identity}}

On a scale of 1 to 10, where 1 is purely mundane (e.g., I need to do the dishes, I need to walk the dog) and 10 is extremely poignant (e.g., I wish to become a professor, I love Elie), rate the likely poignancy of the following thought for {{name}}.

Thought: {{thought}}"#;

const POIGNANCY_CHAT: &str = r#"Here is a brief description of {{name}}:
{{identity}}

On a scale of 1 to 10, where 1 is purely mundane (e.g., routine morning greetings) and 10 is extremely poignant (e.g., a conversation about breaking up, a fight), rate the likely poignancy of the following conversation for {{name}}.

Summary: {{description}}
Conversation:
{{conversation}}"#;

const VALENCE_EVENT: &str = r#"Here is a brief description of {{name}}:
{{identity}}

On a scale of -10 to 10, where -10 is extremely unpleasant, 0 is neutral and 10 is extremely pleasant, rate how {{name}} feels about the following event.

Event: {{event}}"#;

const VALENCE_THOUGHT: &str = r#"Here is a brief description of {{name}}:
{{identity}}

On a scale of -10 to 10, where -10 is extremely unpleasant, 0 is neutral and 10 is extremely pleasant, rate how {{name}} feels about the following thought.

Thought: {{thought}}"#;

const VALENCE_CHAT: &str = r#"Here is a brief description of {{name}}:
{{identity}}

On a scale of -10 to 10, where -10 is extremely unpleasant, 0 is neutral and 10 is extremely pleasant, rate how {{name}} feels about the following conversation.

Summary: {{description}}
Conversation:
{{conversation}}"#;

const WAKE_UP_HOUR: &str = r#"{{identity}}

In general, {{lifestyle}}
What time does {{first_name}} wake up today? Answer with a time like 7:00am."#;

const DAILY_PLANNING: &str = r#"{{identity}}

In general, {{lifestyle}}
Today is {{current_date}}. Here is {{name}}'s plan today in broad strokes, starting with waking up at {{wake_up_hour}}. List the activities in order, each as a short phrase with a time, e.g. "have lunch at 12:00 pm"."#;

const HOURLY_SCHEDULE: &str = r#"{{identity}}

{{name}}'s plan for today in broad strokes:
{{daily_plan}}

Write {{name}}'s schedule for today hour by hour. Give exactly 24 entries, one per hour, labelled 12:00am, 01:00am, ... 11:00pm in that order. Each activity is a short phrase without {{name}}'s name, e.g. "sleeping" or "working on the painting"."#;

const TASK_DECOMP: &str = r#"{{identity}}

Today is {{current_date}}. Here is {{name}}'s schedule around the current activity:
{{schedule}}

In 5 minute increments, list the subtasks {{name}} does while {{activity}} from {{activity_start_time}} to {{activity_end_time}} (total duration in minutes: {{activity_duration}}). For every subtask give its duration and the minutes of the {{activity_duration}} left after it, so the last subtask ends with 0 minutes left."#;

const NEW_DECOMP_SCHEDULE: &str = r#"{{identity}}

Here was {{name}}'s originally planned schedule from {{original_start_time}} to {{original_end_time}}:
{{original_plans}}

But {{name}} unexpectedly ended up {{inserted_activity}} for {{inserted_duration}} minutes. This is what already happened:
{{truncated_plans}}

Revise {{name}}'s schedule from {{planning_from}} to {{original_end_time}} accordingly, starting with the unexpected activity. The durations of the revised entries must add up to exactly {{planning_minutes}} minutes."#;

const ACTION_SECTOR: &str = r#"{{identity}}

{{name}} lives in {{living_sector}}, which has {{living_arenas}}.
{{name}} is currently in {{current_sector}}, which has {{current_arenas}}.
Known areas: {{known_sectors}}.
{{daily_plan_requirements}}

Stay in the current area if the activity can be done there. Never go into other people's rooms unless necessary.
For {{action}} ({{sub_action}}), which one of the known areas should {{name}} go to? Answer with the area name only."#;

const ACTION_ARENA: &str = r#"{{identity}}

{{name}} is in {{current_location}}.
{{name}} is going to {{destination_sector}}, which has the following places: {{known_arenas}}.
Stay in the current place if the activity can be done there. Never go into other people's rooms unless necessary.
For {{activity}} ({{sub_action}}), which place in {{destination_sector}} should {{name}} go to? Answer with the place name only."#;

const ACTION_OBJECT: &str = r#"{{identity}}

{{name}} is going to {{target_location}} to be {{activity}}.
Available objects: {{known_objects}}.
Which one object is the most relevant for this activity? Answer with the object name only."#;

const PRONUNCIATIO: &str = r#"Convert an action description to one or two emoji.

Action description: {{activity}}"#;

const EVENT_TRIPLE: &str = r#"Task: turn the input into (subject, predicate, object).

Input: Sam Johnson is eating breakfast.
Output: (Sam Johnson, eat, breakfast)
Input: Joon Park is brewing coffee.
Output: (Joon Park, brew, coffee)
Input: Jane Cook is sleeping.
Output: (Jane Cook, is, sleep)

Input: {{name}} is {{activity}}.
The subject must be exactly "{{name}}"."#;

const OBJECT_EVENT: &str = r#"{{name}} is {{activity}} and is using the {{object}}.
Describe the state of the {{object}} in a short phrase, e.g. "being used to brew coffee" or "idle"."#;

const DECIDE_TO_TALK: &str = r#"Task: decide whether to start a conversation.

Context: {{context}}

Right now, it is {{current_time}}. {{last_chat}}
{{init_status}}
{{target_status}}

Would {{init_name}} initiate a conversation with {{target_name}}? Answer yes or no in should_talk, with your reasoning."#;

const DECIDE_TO_REACT: &str = r#"Task: decide how to react.

Context: {{context}}

Right now, it is {{current_time}}.
{{init_status}}
{{target_status}}
{{target_name}} will finish at {{target_end_time}}.

Option 1: {{init_name}} waits until {{target_name}} is done.
Option 2: {{init_name}} carries on with their own activity.
Which option should {{init_name}} choose? Answer 1 or 2."#;

const ITERATIVE_CONVO: &str = r#"Context for the task:

PART 1.
{{init_identity}}

Here is the memory that is in {{init_name}}'s head:
{{memories}}

PART 2.
Past context:
{{relationship}}

Current context:
{{init_name}} was {{init_activity}} when {{init_name}} saw {{target_name}} in the middle of {{target_activity}}.
{{init_name}} is starting a conversation with {{target_name}}.
They are in {{current_location}}.

Conversation so far:
{{conversation}}

Given the context, what would {{init_name}} say next to {{target_name}}? Also decide whether this line ends the conversation."#;

const CHAT_RELATIONSHIP: &str = r#"Statements:
{{statements}}

Based on the statements above, summarize {{init_name}} and {{target_name}}'s relationship. What do they feel or know about each other?"#;

const SUMMARIZE_CONVERSATION: &str = r#"Conversation:
{{conversation}}

Summarize the conversation above in one sentence, starting with "conversing about"."#;

const PLANNING_THOUGHT: &str = r#"[Conversation]
{{conversation}}

Write down if there is anything from the conversation that {{name}} needs to remember for their planning, from {{name}}'s perspective."#;

const MEMO_ON_CONVO: &str = r#"[Conversation]
{{conversation}}

Write down if there is anything from the conversation that {{name}} might have found interesting, from {{name}}'s perspective, in a full sentence."#;

const FOCAL_POINTS: &str = r#"{{identity}}

Statements:
{{statements}}

Given only the information above, what are the {{count}} most salient high-level questions we can answer about the subjects in the statements?"#;

const INSIGHT_AND_EVIDENCE: &str = r#"Input:
{{statements}}

What {{count}} high-level insights can you infer from the above statements about {{name}}? For each insight, list the numbers of the statements that support it."#;

const AGENT_FEELINGS: &str = r#"{{identity}}

Statements:
{{statements}}

Given the statements above, how might we summarize {{name}}'s feelings about their days up to now? Answer in one or two sentences, from {{name}}'s perspective."#;

const SCHEDULING_INFORMATION: &str = r#"{{identity}}

Today is {{current_date}}. Statements:
{{statements}}

Given the statements above, is there anything that {{name}} should remember as they plan for {{current_date}}? If there is any scheduling information, be as specific as possible, including date, time and location if stated. Write it from {{name}}'s perspective."#;

const GENERATE_CURRENTLY: &str = r#"{{name}}'s status from {{yesterday}}:
{{currently}}

{{name}}'s thoughts at the end of {{yesterday}}:
{{planning_note}} {{thought_note}}

It is now {{current_date}}. Given the above, write {{name}}'s status for {{current_date}} that reflects {{name}}'s thoughts at the end of {{yesterday}}. Write this in third person talking about {{name}}. If there is any scheduling information, be as specific as possible."#;

const DAILY_REQUIREMENTS: &str = r#"{{identity}}

Today is {{current_date}}. Write {{name}}'s broad goals for today as a short list of sentences, in line with who {{name}} is and what {{name}} is currently doing."#;
