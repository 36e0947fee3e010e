//! Response schemas passed with each request so the service answers in our shape.

use serde_json::{json, Value};

pub fn recognition_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "myHero": { "type": "STRING" },
            "enemyHero": { "type": "STRING" },
            "enemyItems": {
                "type": "ARRAY",
                "items": { "type": "STRING" }
            }
        },
        "required": ["myHero", "enemyHero", "enemyItems"]
    })
}

pub fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "matchupAnalysis": { "type": "STRING" },
            "recommendedItems": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "item": { "type": "STRING" },
                        "reason": { "type": "STRING" }
                    },
                    "required": ["item", "reason"]
                }
            },
            "combos": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "sequence": { "type": "STRING" },
                        "description": { "type": "STRING" }
                    },
                    "required": ["sequence", "description"]
                }
            },
            "strategyTips": {
                "type": "ARRAY",
                "items": { "type": "STRING" }
            }
        },
        "required": ["matchupAnalysis", "recommendedItems", "combos", "strategyTips"]
    })
}
