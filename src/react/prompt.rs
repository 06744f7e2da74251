//! ReAct 提示词
//!
//! 由工具目录、固定示例和当前任务的步骤历史拼成；无历史时以 `Question: ...\nThought:` 结尾，
//! 引导后端从第一个 Thought 开始。

use crate::react::AgentStep;
use crate::tools::{ToolDescriptor, FINISH_ACTION};

/// finish 不经注册表分发，但出现在工具目录里
pub fn finish_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        FINISH_ACTION,
        "Finish Tool",
        "The Finish Tool is used when you have enough information to answer the user's question. \
         Input should be the final answer to provide to the user.",
        "'The building has 24 windows.', 'The door in front of you is named Innentuer-3.', \
         'I have hidden all the stairs in the building.'",
    )
}

/// 示例中的一步：(thought, action, action_input, observation)
type ExampleStep = (&'static str, &'static str, &'static str, &'static str);

pub const EXAMPLES: &[(&str, &[ExampleStep])] = &[
    (
        "How many windows are in the building?",
        &[
            (
                "This is a straightforward information retrieval query about counting windows.",
                "query_building",
                "How many windows are in the building?",
                "[{\"windowCount\": 24}]",
            ),
            (
                "I have the answer the user needs.",
                "finish",
                "There are 24 windows in the building.",
                "Task completed",
            ),
        ],
    ),
    (
        "Hide the door in front of me",
        &[
            (
                "This is a direct modification request that doesn't require querying first.",
                "modify_building",
                "Hide the door in front of me",
                "The query was successfully followed.",
            ),
            (
                "The modification is complete. I can now conclude the task.",
                "finish",
                "I've hidden the door in front of you.",
                "Task completed",
            ),
        ],
    ),
    (
        "What is the height of the door in front of me?",
        &[
            (
                "To answer this, I first need to identify which door is in front of the user using the retrieve_building tool.",
                "retrieve_building",
                "Get the ID of the door in front of me",
                "1TAGlQkKXEnQ4lBJfHnOcM",
            ),
            (
                "Now I have the door ID. I need to query the database to get the height property of this specific door.",
                "query_building",
                "What is the height of the door with ID 1TAGlQkKXEnQ4lBJfHnOcM?",
                "height = 14.0",
            ),
            (
                "I now have all the information needed to answer the user's question.",
                "finish",
                "The height of the door is 14.0 units.",
                "Task completed",
            ),
        ],
    ),
];

fn separator() -> String {
    "=".repeat(50)
}

fn push_step(out: &mut String, thought: &str, action: &str, input: &str, observation: &str) {
    out.push_str(&format!("Thought: {}\n", thought));
    out.push_str(&format!("Action: {}\n", action));
    out.push_str(&format!("Action Input: {}\n", input));
    out.push_str(&format!("Observation: {}\n\n", observation));
}

fn tool_catalog(tools: &[ToolDescriptor]) -> String {
    tools
        .iter()
        .map(|t| {
            format!(
                "{name}: Call this tool to interact with the {human} API.\nWhat is the {human} API useful for?\n{desc}\nExamples: {examples}",
                name = t.name,
                human = t.human_name,
                desc = t.description,
                examples = t.examples
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_examples() -> String {
    let mut out = String::new();
    for (i, (question, steps)) in EXAMPLES.iter().enumerate() {
        out.push_str(&format!("\n{sep}\nExample {}:\n{sep}\n", i + 1, sep = separator()));
        out.push_str(&format!("User Question: {}\n\n", question));
        for (thought, action, input, observation) in steps.iter() {
            push_step(&mut out, thought, action, input, observation);
        }
    }
    out
}

fn format_history(query: &str, history: &[AgentStep]) -> String {
    let mut out = format!("\n{sep}\nCurrent Task Progress:\n{sep}\n", sep = separator());
    out.push_str(&format!("User Question: {}\n\n", query));
    for step in history {
        push_step(&mut out, &step.thought, &step.action, &step.action_input, &step.observation);
    }
    out
}

/// 渲染一轮提示词；`tools` 是已注册工具的描述（finish 自动追加在末尾）
pub fn render_prompt(tools: &[ToolDescriptor], query: &str, history: &[AgentStep]) -> String {
    let mut catalog: Vec<ToolDescriptor> = tools.to_vec();
    catalog.push(finish_descriptor());
    let names = catalog.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ");

    let mut prompt = format!(
        "You are an intelligent agent that helps users interact with building information models (BIM).
Answer the following questions as best you can. You have access to the following tools:

{tools}

Important rules:
1. If you need to identify a specific element (like \"door in front of me\"), use retrieve_building tool first to get its ID.
2. If you need to query properties of a specific element, use query_building tool with the ID (IFC_global_id in the schema).
3. Chain tools when necessary - use output from one tool as input to another.
4. Be concise.

Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can be repeated zero or more times)
Thought: I now know the final answer
Action: finish
Action Input: the final answer to the original input question

Here are some examples of how to solve tasks using these tools (DO NOT take the examples' information into account, they are only for reference):
{examples}

The examples have finished. Now, Begin!
",
        tools = tool_catalog(&catalog),
        names = names,
        examples = format_examples(),
    );

    if history.is_empty() {
        prompt.push_str(&format!("\n\nQuestion: {}\nThought:", query));
    } else {
        prompt.push_str(&format_history(query, history));
        prompt.push('\n');
    }
    prompt
}
